use super::{InnerNetObject, RpcContext};
use crate::error::HandleResult;
use crate::rpc::{RpcRule, SenderRule, TargetRule};
use log::{debug, trace};
use shared::protocol::DeathReason;
use shared::{CodecError, MessageReader, MessageWriter};
use std::collections::BTreeMap;
use std::time::Instant;

/// Rpc call numbers of [`GameData`]
pub mod calls {
    pub const SET_TASKS: u8 = 29;
    pub const UPDATE_GAME_DATA: u8 = 30;
}

const RULES: &[RpcRule] = &[
    RpcRule::new(calls::SET_TASKS, "SetTasks", SenderRule::Host, TargetRule::Broadcast),
    RpcRule::new(
        calls::UPDATE_GAME_DATA,
        "UpdateGameData",
        SenderRule::Host,
        TargetRule::Broadcast,
    ),
];

const FLAG_DISCONNECTED: u8 = 1;
const FLAG_DEAD: u8 = 4;

/// Cosmetic value the client reports before it has loaded the real one
const PLACEHOLDER: &str = "missing";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: u32,
    pub complete: bool,
}

/// Per-player row of the game data registry
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub player_id: u8,
    pub name: String,
    /// `u8::MAX` until a color has been chosen
    pub color: u8,
    pub hat: String,
    pub pet: String,
    pub skin: String,
    pub disconnected: bool,
    pub role_name: String,
    pub enabled_mods: Vec<String>,
    pub is_dead: bool,
    pub death_reason: Option<DeathReason>,
    pub tasks: Vec<TaskInfo>,
    pub last_murder: Option<Instant>,
}

impl PlayerInfo {
    pub fn new(player_id: u8) -> Self {
        Self {
            player_id,
            name: String::new(),
            color: u8::MAX,
            hat: String::new(),
            pet: String::new(),
            skin: String::new(),
            disconnected: false,
            role_name: String::new(),
            enabled_mods: Vec::new(),
            is_dead: false,
            death_reason: None,
            tasks: Vec::new(),
            last_murder: None,
        }
    }

    /// Whether name, color and every cosmetic have been set for real
    pub fn is_spawn_complete(&self) -> bool {
        let set = |value: &str| !value.is_empty() && value != PLACEHOLDER;
        set(&self.name)
            && self.color != u8::MAX
            && set(&self.hat)
            && set(&self.skin)
            && set(&self.pet)
    }

    /// Marks the player dead; the row stays in the registry
    pub fn die(&mut self, reason: DeathReason) {
        self.is_dead = true;
        self.death_reason = Some(reason);
    }

    /// Reads one row body as the host sends it in `UpdateGameData`
    pub fn deserialize(&mut self, reader: &mut MessageReader<'_>) -> Result<(), CodecError> {
        self.name = reader.read_string()?;
        self.color = reader.read_u8()?;
        self.hat = reader.read_string()?;
        self.pet = reader.read_string()?;
        self.skin = reader.read_string()?;

        let flags = reader.read_u8()?;
        self.disconnected = flags & FLAG_DISCONNECTED != 0;
        self.is_dead = flags & FLAG_DEAD != 0;

        let count = reader.read_u8()?;
        let mut tasks = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            tasks.push(TaskInfo {
                id: reader.read_packed_u32()?,
                complete: reader.read_bool()?,
            });
        }
        self.tasks = tasks;
        Ok(())
    }

    pub fn serialize(&self, writer: &mut MessageWriter) {
        writer.write_string(&self.name);
        writer.write_u8(self.color);
        writer.write_string(&self.hat);
        writer.write_string(&self.pet);
        writer.write_string(&self.skin);

        let mut flags = 0;
        if self.disconnected {
            flags |= FLAG_DISCONNECTED;
        }
        if self.is_dead {
            flags |= FLAG_DEAD;
        }
        writer.write_u8(flags);

        writer.write_u8(self.tasks.len() as u8);
        for task in &self.tasks {
            writer.write_packed_u32(task.id);
            writer.write_bool(task.complete);
        }
    }
}

/// Registry of every player's metadata, owned by the host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameData {
    players: BTreeMap<u8, PlayerInfo>,
}

impl GameData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player(&self, player_id: u8) -> Option<&PlayerInfo> {
        self.players.get(&player_id)
    }

    pub fn player_mut(&mut self, player_id: u8) -> Option<&mut PlayerInfo> {
        self.players.get_mut(&player_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerInfo> {
        self.players.values()
    }

    /// Adds a row for a freshly spawned character. An existing row is kept.
    pub fn add_player(&mut self, player_id: u8) -> &mut PlayerInfo {
        self.players
            .entry(player_id)
            .or_insert_with(|| PlayerInfo::new(player_id))
    }

    pub fn remove_player(&mut self, player_id: u8) -> Option<PlayerInfo> {
        self.players.remove(&player_id)
    }

    fn read_player(&mut self, player_id: u8, reader: &mut MessageReader<'_>) -> HandleResult {
        self.add_player(player_id).deserialize(reader)?;
        Ok(())
    }

    fn set_tasks(&mut self, player_id: u8, task_ids: &[u8]) {
        let Some(player) = self.players.get_mut(&player_id) else {
            trace!("Could not set tasks for player {}", player_id);
            return;
        };

        if player.disconnected {
            return;
        }

        player.tasks = task_ids
            .iter()
            .map(|id| TaskInfo {
                id: u32::from(*id),
                complete: false,
            })
            .collect();
    }
}

/// Only the host edits the registry, and always by broadcast
impl InnerNetObject for GameData {
    fn name(&self) -> &'static str {
        "GameData"
    }

    fn rpc_rules(&self) -> &'static [RpcRule] {
        RULES
    }

    fn handle_rpc(
        &mut self,
        _ctx: &mut RpcContext<'_>,
        call: u8,
        reader: &mut MessageReader<'_>,
    ) -> HandleResult {
        match call {
            calls::SET_TASKS => {
                let player_id = reader.read_u8()?;
                let task_ids = reader.read_bytes_and_size()?;
                self.set_tasks(player_id, task_ids);
            }
            _ => {
                while !reader.is_exhausted() {
                    let mut row = reader.read_message()?;
                    self.read_player(row.tag(), &mut row)?;
                }
            }
        }
        Ok(())
    }

    fn deserialize(
        &mut self,
        ctx: &mut RpcContext<'_>,
        reader: &mut MessageReader<'_>,
        initial: bool,
    ) -> HandleResult {
        ctx.require_host(self.name())?;

        let count = if initial {
            reader.read_packed_u32()?
        } else {
            u32::from(reader.read_u8()?)
        };

        for _ in 0..count {
            let player_id = reader.read_u8()?;
            self.read_player(player_id, reader)?;
        }
        debug!("GameData now holds {} players", self.players.len());
        Ok(())
    }
}
