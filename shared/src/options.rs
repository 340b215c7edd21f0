use crate::codec::{CodecError, MessageReader, MessageWriter};
use serde::Serialize;

/// Lobby settings chosen by the host
///
/// Parsed from the blob carried by `HostGame` and by the `SyncSettings` call.
/// Anything after the known fields belongs to newer clients and is kept as-is
/// so it can be written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameOptions {
    pub version: u8,
    pub max_players: u8,
    pub keywords: u32,
    pub map: u8,
    pub player_speed: f32,
    pub crew_light: f32,
    pub impostor_light: f32,
    pub kill_cooldown: f32,
    pub common_tasks: u8,
    pub long_tasks: u8,
    pub short_tasks: u8,
    pub emergency_meetings: i32,
    pub impostors: u8,
    pub kill_distance: u8,
    pub discussion_time: i32,
    pub voting_time: i32,
    pub is_defaults: Option<bool>,
    #[serde(skip)]
    pub extra: Vec<u8>,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            version: 4,
            max_players: 10,
            keywords: 1,
            map: 0,
            player_speed: 1.0,
            crew_light: 1.0,
            impostor_light: 1.5,
            kill_cooldown: 15.0,
            common_tasks: 1,
            long_tasks: 1,
            short_tasks: 2,
            emergency_meetings: 1,
            impostors: 1,
            kill_distance: 1,
            discussion_time: 15,
            voting_time: 120,
            is_defaults: Some(true),
            extra: Vec::new(),
        }
    }
}

impl GameOptions {
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = MessageReader::new(0, bytes);

        let mut options = Self {
            version: reader.read_u8()?,
            max_players: reader.read_u8()?,
            keywords: reader.read_u32()?,
            map: reader.read_u8()?,
            player_speed: reader.read_f32()?,
            crew_light: reader.read_f32()?,
            impostor_light: reader.read_f32()?,
            kill_cooldown: reader.read_f32()?,
            common_tasks: reader.read_u8()?,
            long_tasks: reader.read_u8()?,
            short_tasks: reader.read_u8()?,
            emergency_meetings: reader.read_i32()?,
            impostors: reader.read_u8()?,
            kill_distance: reader.read_u8()?,
            discussion_time: reader.read_i32()?,
            voting_time: reader.read_i32()?,
            is_defaults: None,
            extra: Vec::new(),
        };

        if !reader.is_exhausted() {
            options.is_defaults = Some(reader.read_bool()?);
            options.extra = reader.rest().to_vec();
        }

        Ok(options)
    }

    pub fn serialize(&self, writer: &mut MessageWriter) {
        writer.write_u8(self.version);
        writer.write_u8(self.max_players);
        writer.write_u32(self.keywords);
        writer.write_u8(self.map);
        writer.write_f32(self.player_speed);
        writer.write_f32(self.crew_light);
        writer.write_f32(self.impostor_light);
        writer.write_f32(self.kill_cooldown);
        writer.write_u8(self.common_tasks);
        writer.write_u8(self.long_tasks);
        writer.write_u8(self.short_tasks);
        writer.write_i32(self.emergency_meetings);
        writer.write_u8(self.impostors);
        writer.write_u8(self.kill_distance);
        writer.write_i32(self.discussion_time);
        writer.write_i32(self.voting_time);
        if let Some(is_defaults) = self.is_defaults {
            writer.write_bool(is_defaults);
            writer.write_bytes(&self.extra);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = MessageWriter::new();
        self.serialize(&mut writer);
        writer.into_bytes()
    }
}
