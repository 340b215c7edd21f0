//! Builders for the messages exchanged with clients
//!
//! Server replies live at the top level; [`requests`] holds the client side of
//! the conversation, used by the test client and by tests that drive the
//! server without a real game client.

use shared::protocol::{GameDataTag, MessageFlags};
use shared::{DisconnectReason, GameCode, MessageWriter};

fn start(writer: &mut MessageWriter, flag: MessageFlags) {
    writer.start_message(flag.as_u8());
}

pub fn host_game_reply(code: GameCode) -> MessageWriter {
    let mut writer = MessageWriter::new();
    start(&mut writer, MessageFlags::HostGame);
    writer.write_i32(code.value());
    writer.end_message();
    writer
}

/// `JoinGame` carrying a refusal; sent before the connection is dropped
pub fn join_error(reason: DisconnectReason, message: Option<&str>) -> MessageWriter {
    let mut writer = MessageWriter::new();
    start(&mut writer, MessageFlags::JoinGame);
    writer.write_i32(i32::from(reason.as_u8()));
    if reason == DisconnectReason::Custom {
        writer.write_string(message.unwrap_or_default());
    }
    writer.end_message();
    writer
}

pub fn joined_game(code: GameCode, client_id: i32, host_id: i32, others: &[i32]) -> MessageWriter {
    let mut writer = MessageWriter::new();
    start(&mut writer, MessageFlags::JoinedGame);
    writer.write_i32(code.value());
    writer.write_i32(client_id);
    writer.write_i32(host_id);
    writer.write_packed_u32(others.len() as u32);
    for id in others {
        writer.write_packed_i32(*id);
    }
    writer.end_message();
    writer
}

/// Tells the players already in a game that someone joined
pub fn player_joined(code: GameCode, client_id: i32, host_id: i32) -> MessageWriter {
    let mut writer = MessageWriter::new();
    start(&mut writer, MessageFlags::JoinGame);
    writer.write_i32(code.value());
    writer.write_i32(client_id);
    writer.write_i32(host_id);
    writer.end_message();
    writer
}

pub fn player_removed(
    code: GameCode,
    client_id: i32,
    host_id: i32,
    reason: DisconnectReason,
) -> MessageWriter {
    let mut writer = MessageWriter::new();
    start(&mut writer, MessageFlags::RemovePlayer);
    writer.write_i32(code.value());
    writer.write_i32(client_id);
    writer.write_i32(host_id);
    writer.write_u8(reason.as_u8());
    writer.end_message();
    writer
}

pub fn alter_game(code: GameCode, is_public: bool) -> MessageWriter {
    let mut writer = MessageWriter::new();
    start(&mut writer, MessageFlags::AlterGame);
    writer.write_i32(code.value());
    writer.write_u8(shared::protocol::AlterGameTag::ChangePrivacy.as_u8());
    writer.write_bool(is_public);
    writer.end_message();
    writer
}

pub fn kick_player(code: GameCode, client_id: i32, ban: bool) -> MessageWriter {
    let mut writer = MessageWriter::new();
    start(&mut writer, MessageFlags::KickPlayer);
    writer.write_i32(code.value());
    writer.write_packed_i32(client_id);
    writer.write_bool(ban);
    writer.end_message();
    writer
}

pub fn wait_for_host(code: GameCode, client_id: i32) -> MessageWriter {
    let mut writer = MessageWriter::new();
    start(&mut writer, MessageFlags::WaitForHost);
    writer.write_i32(code.value());
    writer.write_i32(client_id);
    writer.end_message();
    writer
}

pub fn game_list(json: &str) -> MessageWriter {
    let mut writer = MessageWriter::new();
    start(&mut writer, MessageFlags::GetGameListV2);
    writer.write_string(json);
    writer.end_message();
    writer
}

/// Body of a disconnect datagram: the reason byte, plus text for `Custom`
pub fn disconnect_payload(reason: DisconnectReason, message: Option<&str>) -> Vec<u8> {
    let mut writer = MessageWriter::new();
    writer.start_message(0);
    writer.write_u8(reason.as_u8());
    if reason == DisconnectReason::Custom {
        writer.write_string(message.unwrap_or_default());
    }
    writer.end_message();
    writer.into_bytes()
}

/// `GameDataTo` holding a single RPC, used for server-originated calls
pub fn rpc_to(
    code: GameCode,
    target: i32,
    net_id: u32,
    call: u8,
    body: impl FnOnce(&mut MessageWriter),
) -> MessageWriter {
    let mut writer = MessageWriter::new();
    start(&mut writer, MessageFlags::GameDataTo);
    writer.write_i32(code.value());
    writer.write_packed_i32(target);
    write_rpc(&mut writer, net_id, call, body);
    writer.end_message();
    writer
}

pub fn write_rpc(
    writer: &mut MessageWriter,
    net_id: u32,
    call: u8,
    body: impl FnOnce(&mut MessageWriter),
) {
    writer.start_message(GameDataTag::Rpc.as_u8());
    writer.write_packed_u32(net_id);
    writer.write_u8(call);
    body(writer);
    writer.end_message();
}

pub fn write_data(writer: &mut MessageWriter, net_id: u32, body: impl FnOnce(&mut MessageWriter)) {
    writer.start_message(GameDataTag::Data.as_u8());
    writer.write_packed_u32(net_id);
    body(writer);
    writer.end_message();
}

/// Spawn record; each component is its net id and initial state bytes
pub fn write_spawn(
    writer: &mut MessageWriter,
    spawn_type: u32,
    owner_id: i32,
    flags: u8,
    components: &[(u32, Vec<u8>)],
) {
    writer.start_message(GameDataTag::Spawn.as_u8());
    writer.write_packed_u32(spawn_type);
    writer.write_packed_i32(owner_id);
    writer.write_u8(flags);
    writer.write_packed_u32(components.len() as u32);
    for (net_id, data) in components {
        writer.write_packed_u32(*net_id);
        writer.start_message(1);
        writer.write_bytes(data);
        writer.end_message();
    }
    writer.end_message();
}

pub fn write_despawn(writer: &mut MessageWriter, net_id: u32) {
    writer.start_message(GameDataTag::Despawn.as_u8());
    writer.write_packed_u32(net_id);
    writer.end_message();
}

pub fn write_scene_change(writer: &mut MessageWriter, client_id: i32, scene: &str) {
    writer.start_message(GameDataTag::SceneChange.as_u8());
    writer.write_packed_i32(client_id);
    writer.write_string(scene);
    writer.end_message();
}

pub mod requests {
    use super::start;
    use shared::protocol::MessageFlags;
    use shared::{GameCode, GameOptions, GameVersion, MessageWriter};

    /// Payload carried by the transport's hello packet
    pub fn handshake(version: GameVersion, name: &str, device_id: Option<&str>) -> Vec<u8> {
        let mut writer = MessageWriter::new();
        writer.write_i32(version.0);
        writer.write_string(name);
        if let Some(device_id) = device_id {
            writer.write_string(device_id);
        }
        writer.into_bytes()
    }

    pub fn host_game(options: &GameOptions) -> MessageWriter {
        let mut writer = MessageWriter::new();
        start(&mut writer, MessageFlags::HostGame);
        writer.write_bytes_and_size(&options.to_bytes());
        writer.end_message();
        writer
    }

    pub fn join_game(code: GameCode) -> MessageWriter {
        code_only(MessageFlags::JoinGame, code)
    }

    pub fn start_game(code: GameCode) -> MessageWriter {
        code_only(MessageFlags::StartGame, code)
    }

    pub fn end_game(code: GameCode, reason: u8) -> MessageWriter {
        let mut writer = MessageWriter::new();
        start(&mut writer, MessageFlags::EndGame);
        writer.write_i32(code.value());
        writer.write_u8(reason);
        writer.write_bool(false);
        writer.end_message();
        writer
    }

    pub fn alter_game(code: GameCode, is_public: bool) -> MessageWriter {
        let mut writer = MessageWriter::new();
        start(&mut writer, MessageFlags::AlterGame);
        writer.write_i32(code.value());
        writer.write_u8(shared::protocol::AlterGameTag::ChangePrivacy.as_u8());
        writer.write_bool(is_public);
        writer.end_message();
        writer
    }

    pub fn kick_player(code: GameCode, client_id: i32, ban: bool) -> MessageWriter {
        let mut writer = MessageWriter::new();
        start(&mut writer, MessageFlags::KickPlayer);
        writer.write_i32(code.value());
        writer.write_packed_i32(client_id);
        writer.write_bool(ban);
        writer.end_message();
        writer
    }

    pub fn kick_with_reason(code: GameCode, client_id: i32, reason: &str) -> MessageWriter {
        let mut writer = MessageWriter::new();
        start(&mut writer, MessageFlags::KickWithReason);
        writer.write_i32(code.value());
        writer.write_packed_i32(client_id);
        writer.write_string(reason);
        writer.end_message();
        writer
    }

    pub fn remove_player(code: GameCode, client_id: i32, reason: u8) -> MessageWriter {
        let mut writer = MessageWriter::new();
        start(&mut writer, MessageFlags::RemovePlayer);
        writer.write_i32(code.value());
        writer.write_packed_i32(client_id);
        writer.write_u8(reason);
        writer.end_message();
        writer
    }

    pub fn get_game_list() -> MessageWriter {
        let mut writer = MessageWriter::new();
        start(&mut writer, MessageFlags::GetGameListV2);
        writer.end_message();
        writer
    }

    /// `GameData` (or `GameDataTo` when `target` is set) wrapping whatever
    /// sub-messages `body` writes
    pub fn game_data(
        code: GameCode,
        target: Option<i32>,
        body: impl FnOnce(&mut MessageWriter),
    ) -> MessageWriter {
        let mut writer = MessageWriter::new();
        match target {
            Some(target) => {
                start(&mut writer, MessageFlags::GameDataTo);
                writer.write_i32(code.value());
                writer.write_packed_i32(target);
            }
            None => {
                start(&mut writer, MessageFlags::GameData);
                writer.write_i32(code.value());
            }
        }
        body(&mut writer);
        writer.end_message();
        writer
    }

    fn code_only(flag: MessageFlags, code: GameCode) -> MessageWriter {
        let mut writer = MessageWriter::new();
        start(&mut writer, flag);
        writer.write_i32(code.value());
        writer.end_message();
        writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MessageReader;

    #[test]
    fn test_join_error_custom_carries_text() {
        let bytes = join_error(DisconnectReason::Custom, Some("nope")).into_bytes();
        let mut outer = MessageReader::new(u8::MAX, &bytes);
        let mut message = outer.read_message().unwrap();

        assert_eq!(message.tag(), MessageFlags::JoinGame.as_u8());
        assert_eq!(message.read_i32().unwrap(), 8);
        assert_eq!(message.read_string().unwrap(), "nope");
        assert!(message.is_exhausted());
    }

    #[test]
    fn test_join_error_plain_reason() {
        let bytes = join_error(DisconnectReason::GameFull, None).into_bytes();
        let mut outer = MessageReader::new(u8::MAX, &bytes);
        let mut message = outer.read_message().unwrap();

        assert_eq!(message.read_i32().unwrap(), 1);
        assert!(message.is_exhausted());
    }

    #[test]
    fn test_joined_game_layout() {
        let code = GameCode::new(-42);
        let bytes = joined_game(code, 2, 1, &[1]).into_bytes();
        let mut outer = MessageReader::new(u8::MAX, &bytes);
        let mut message = outer.read_message().unwrap();

        assert_eq!(message.tag(), MessageFlags::JoinedGame.as_u8());
        assert_eq!(message.read_i32().unwrap(), -42);
        assert_eq!(message.read_i32().unwrap(), 2);
        assert_eq!(message.read_i32().unwrap(), 1);
        assert_eq!(message.read_packed_u32().unwrap(), 1);
        assert_eq!(message.read_packed_i32().unwrap(), 1);
    }

    #[test]
    fn test_rpc_to_layout() {
        let code = GameCode::new(7);
        let bytes = rpc_to(code, 3, 10, 13, |writer| writer.write_string("hi")).into_bytes();
        let mut outer = MessageReader::new(u8::MAX, &bytes);
        let mut message = outer.read_message().unwrap();

        assert_eq!(message.tag(), MessageFlags::GameDataTo.as_u8());
        assert_eq!(message.read_i32().unwrap(), 7);
        assert_eq!(message.read_packed_i32().unwrap(), 3);

        let mut rpc = message.read_message().unwrap();
        assert_eq!(rpc.tag(), GameDataTag::Rpc.as_u8());
        assert_eq!(rpc.read_packed_u32().unwrap(), 10);
        assert_eq!(rpc.read_u8().unwrap(), 13);
        assert_eq!(rpc.read_string().unwrap(), "hi");
    }
}
