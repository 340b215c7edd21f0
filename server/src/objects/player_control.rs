//! A player's character: identity, cosmetics and life state
//!
//! Most calls only touch the character's row in the game data registry, which
//! is looked up through the player id the host assigned at spawn time.

use super::{InnerNetObject, PlayerInfo, RpcContext};
use crate::error::{HandleError, HandleResult};
use crate::events::GameEvent;
use crate::game::GameState;
use crate::rpc::{RpcRule, SenderRule, TargetRule};
use log::{debug, info, warn};
use shared::protocol::{ChatNoteType, DeathReason};
use shared::{GameOptions, MessageReader};
use std::time::Instant;

/// Rpc call numbers of [`PlayerControl`]
pub mod calls {
    pub const PLAY_ANIMATION: u8 = 0;
    pub const COMPLETE_TASK: u8 = 1;
    pub const SYNC_SETTINGS: u8 = 2;
    pub const SET_INFECTED: u8 = 3;
    pub const EXILED: u8 = 4;
    pub const CHECK_NAME: u8 = 5;
    pub const SET_NAME: u8 = 6;
    pub const CHECK_COLOR: u8 = 7;
    pub const SET_COLOR: u8 = 8;
    pub const SET_HAT: u8 = 9;
    pub const SET_SKIN: u8 = 10;
    pub const REPORT_DEAD_BODY: u8 = 11;
    pub const MURDER_PLAYER: u8 = 12;
    pub const SEND_CHAT: u8 = 13;
    pub const START_MEETING: u8 = 15;
    pub const SET_SCANNER: u8 = 16;
    pub const SEND_CHAT_NOTE: u8 = 17;
    pub const SET_PET: u8 = 18;
    pub const SET_START_COUNTER: u8 = 19;
    pub const SET_PLAYER_SCALE: u8 = 20;
    pub const SET_ROLE: u8 = 21;
    pub const START_GAME: u8 = 22;
    pub const CHECK_MURDER: u8 = 23;
    pub const SET_COOLDOWN: u8 = 24;
    pub const ROLE_RPC: u8 = 25;
    pub const SYNC_ROLE_SETTINGS: u8 = 26;
    pub const SERVER_MODS: u8 = 27;
    pub const SYNC_ROLE_OPTION: u8 = 28;
    pub const SPAWN_MAP: u8 = 81;
}

use SenderRule::{Host, HostAndOwner, HostIfSupported, Owner, OwnerOrHost};
use TargetRule::{Any, Broadcast};

/// Sender and target policy for every character call, by call number
pub const RULES: &[RpcRule] = &[
    RpcRule::new(calls::PLAY_ANIMATION, "PlayAnimation", OwnerOrHost, Broadcast),
    RpcRule::new(calls::COMPLETE_TASK, "CompleteTask", OwnerOrHost, Broadcast),
    RpcRule::new(calls::SYNC_SETTINGS, "SyncSettings", Host, Any),
    RpcRule::new(calls::SET_INFECTED, "SetInfected", OwnerOrHost, Any),
    RpcRule::new(calls::EXILED, "Exiled", Host, Broadcast),
    RpcRule::new(calls::CHECK_NAME, "CheckName", OwnerOrHost, TargetRule::Host),
    RpcRule::new(calls::SET_NAME, "SetName", OwnerOrHost, Broadcast),
    RpcRule::new(calls::CHECK_COLOR, "CheckColor", OwnerOrHost, TargetRule::Host),
    RpcRule::new(calls::SET_COLOR, "SetColor", OwnerOrHost, Broadcast),
    RpcRule::new(calls::SET_HAT, "SetHat", OwnerOrHost, Broadcast),
    RpcRule::new(calls::SET_SKIN, "SetSkin", OwnerOrHost, Broadcast),
    RpcRule::new(calls::REPORT_DEAD_BODY, "ReportDeadBody", OwnerOrHost, Broadcast),
    RpcRule::new(calls::MURDER_PLAYER, "MurderPlayer", HostIfSupported, Broadcast),
    RpcRule::new(calls::SEND_CHAT, "SendChat", Owner, Broadcast),
    RpcRule::new(calls::START_MEETING, "StartMeeting", Host, Broadcast),
    RpcRule::new(calls::SET_SCANNER, "SetScanner", OwnerOrHost, Broadcast),
    RpcRule::new(calls::SEND_CHAT_NOTE, "SendChatNote", HostAndOwner, Broadcast),
    RpcRule::new(calls::SET_PET, "SetPet", OwnerOrHost, Broadcast),
    RpcRule::new(calls::SET_START_COUNTER, "SetStartCounter", OwnerOrHost, Broadcast),
    RpcRule::new(calls::SET_PLAYER_SCALE, "SetPlayerScale", Host, Any),
    RpcRule::new(calls::SET_ROLE, "SetRole", Host, Any),
    RpcRule::new(calls::START_GAME, "StartGame", Host, Any),
    RpcRule::new(calls::CHECK_MURDER, "CheckMurder", OwnerOrHost, Broadcast),
    RpcRule::new(calls::SET_COOLDOWN, "SetCooldown", Host, Any),
    RpcRule::new(calls::ROLE_RPC, "RoleRpc", OwnerOrHost, Any),
    RpcRule::new(calls::SYNC_ROLE_SETTINGS, "SyncRoleSettings", Host, Any),
    RpcRule::new(calls::SERVER_MODS, "ServerMods", OwnerOrHost, Any),
    RpcRule::new(calls::SYNC_ROLE_OPTION, "SyncRoleOption", Host, Any),
    RpcRule::new(calls::SPAWN_MAP, "SpawnMap", Host, Any),
];

/// Player id the character has before the host assigns one
pub const UNASSIGNED: u8 = u8::MAX;

/// A player's character, owned by that player's client
///
/// The physics and transform components are separate objects; this one only
/// remembers their network ids so they can be retired together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerControl {
    /// Carried in the initial spawn data only
    pub is_new: bool,
    pub player_id: u8,
    pub physics_net_id: u32,
    pub transform_net_id: u32,
}

impl PlayerControl {
    pub fn new(player_id: u8, physics_net_id: u32, transform_net_id: u32) -> Self {
        Self {
            is_new: false,
            player_id,
            physics_net_id,
            transform_net_id,
        }
    }

    /// Runs `apply` against this character's registry row, if it has one
    fn with_info(&self, ctx: &mut RpcContext<'_>, apply: impl FnOnce(&mut PlayerInfo)) {
        match ctx.player_info_mut(self.player_id) {
            Some(info) => apply(info),
            None => debug!("Player {} has no game data yet", self.player_id),
        }
    }

    fn murder(&self, ctx: &mut RpcContext<'_>, victim_net_id: u32) -> HandleResult {
        let victim_id = if victim_net_id == ctx.net_id {
            Some(self.player_id)
        } else {
            ctx.objects
                .player_control(victim_net_id)
                .map(|victim| victim.player_id)
        };
        let Some(victim_id) = victim_id else {
            return Err(HandleError::cancel(format!(
                "MurderPlayer target {} is not a player",
                victim_net_id
            )));
        };

        let killer = ctx.sender.client_id;
        let Some(victim) = ctx.player_info_mut(victim_id) else {
            return Err(HandleError::cancel(format!(
                "MurderPlayer target {} has no game data",
                victim_id
            )));
        };
        if victim.is_dead {
            return Ok(());
        }

        victim.die(DeathReason::Kill);
        info!("{} was murdered by client {}", victim.name, killer);

        if let Some(info) = ctx.player_info_mut(self.player_id) {
            info.last_murder = Some(Instant::now());
        }
        ctx.publish(GameEvent::PlayerMurder {
            code: ctx.code,
            client_id: killer,
            victim: victim_id,
        });
        Ok(())
    }
}

fn parse_mods(json: &str) -> Vec<String> {
    serde_json::from_str::<Option<Vec<String>>>(json)
        .ok()
        .flatten()
        .unwrap_or_else(|| vec!["nomods".to_string()])
}

/// Calls reach this impl only after [`RULES`] allowed them; most of them
/// update the character's game data row
impl InnerNetObject for PlayerControl {
    fn name(&self) -> &'static str {
        "PlayerControl"
    }

    fn rpc_rules(&self) -> &'static [RpcRule] {
        RULES
    }

    fn handle_rpc(
        &mut self,
        ctx: &mut RpcContext<'_>,
        call: u8,
        reader: &mut MessageReader<'_>,
    ) -> HandleResult {
        match call {
            calls::PLAY_ANIMATION => {
                reader.read_u8()?;
            }
            calls::COMPLETE_TASK => {
                let index = reader.read_packed_u32()?;
                let completed = ctx
                    .player_info_mut(self.player_id)
                    .and_then(|info| info.tasks.get_mut(index as usize))
                    .map(|task| task.complete = true)
                    .is_some();

                if completed {
                    ctx.publish(GameEvent::TaskCompleted {
                        code: ctx.code,
                        client_id: ctx.sender.client_id,
                        task_index: index,
                    });
                } else {
                    warn!("Client sent CompleteTask with a task index that is not assigned");
                }
            }
            calls::SYNC_SETTINGS => {
                *ctx.options = GameOptions::deserialize(reader.read_bytes_and_size()?)?;
            }
            calls::EXILED => {
                self.with_info(ctx, |info| info.die(DeathReason::Exile));
                ctx.publish(GameEvent::PlayerExile {
                    code: ctx.code,
                    player_id: self.player_id,
                });
            }
            calls::CHECK_NAME => {
                reader.read_string()?;
            }
            calls::SET_NAME => {
                let name = reader.read_string()?;
                self.with_info(ctx, |info| info.name = name);
            }
            calls::CHECK_COLOR => {
                reader.read_u8()?;
            }
            calls::SET_COLOR => {
                let color = reader.read_u8()?;
                self.with_info(ctx, |info| info.color = color);
            }
            calls::SET_HAT => {
                let hat = reader.read_string()?;
                self.with_info(ctx, |info| info.hat = hat);
            }
            calls::SET_SKIN => {
                let skin = reader.read_string()?;
                self.with_info(ctx, |info| info.skin = skin);
            }
            calls::SET_PET => {
                let pet = reader.read_string()?;
                self.with_info(ctx, |info| info.pet = pet);
            }
            calls::REPORT_DEAD_BODY => {
                // u8::MAX means the emergency button
                reader.read_u8()?;
            }
            calls::MURDER_PLAYER => {
                let victim = reader.read_packed_u32()?;
                self.murder(ctx, victim)?;
            }
            calls::SEND_CHAT => {
                let message = reader.read_string()?;
                info!("Client {} sent: {}", ctx.sender.client_id, message);
                ctx.publish(GameEvent::PlayerChat {
                    code: ctx.code,
                    client_id: ctx.sender.client_id,
                    message,
                });
            }
            calls::START_MEETING => {
                let body = reader.read_u8()?;
                ctx.publish(GameEvent::MeetingStarted {
                    code: ctx.code,
                    client_id: ctx.owner_id,
                    body: (body != u8::MAX).then_some(body),
                });
            }
            calls::SET_SCANNER => {
                reader.read_bool()?;
                reader.read_u8()?;
            }
            calls::SEND_CHAT_NOTE => {
                reader.read_u8()?;
                let note = reader.read_u8()?;
                if ChatNoteType::from_u8(note).is_none() {
                    return Err(HandleError::cheat(
                        "Client sent SendChatNote with a invalid chat note type",
                    ));
                }
            }
            calls::SET_START_COUNTER => {
                reader.read_packed_u32()?;
                let seconds_left = reader.read_u8()?;
                if seconds_left < u8::MAX {
                    ctx.publish(GameEvent::StartCounter {
                        code: ctx.code,
                        client_id: ctx.sender.client_id,
                        seconds_left,
                    });
                }
            }
            calls::SET_ROLE => {
                let role = reader.read_string()?;
                info!("Player {} role was set to {}", self.player_id, role);
                self.with_info(ctx, |info| info.role_name = role);
            }
            calls::START_GAME => {
                info!("Role cutscene started for {}", ctx.code);
                if *ctx.state == GameState::Starting {
                    *ctx.state = GameState::Started;
                    ctx.publish(GameEvent::GameStarted { code: ctx.code });
                }
            }
            calls::ROLE_RPC => {
                let rpc_id = reader.read_i32()?;
                let role = ctx
                    .objects
                    .player_info(self.player_id)
                    .map(|info| info.role_name.replace("Role", ""))
                    .unwrap_or_default();
                info!("Player {} sent {}RPC ({})", self.player_id, role, rpc_id);
            }
            calls::SERVER_MODS => {
                let mods = parse_mods(&reader.read_string()?);
                self.with_info(ctx, |info| info.enabled_mods = mods);
            }
            // SetInfected, CheckMurder, SpawnMap and the role/cooldown
            // syncs carry nothing the server tracks
            _ => {}
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

        if initial {
            self.is_new = reader.read_bool()?;
        }
        self.player_id = reader.read_u8()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::test_support::*;
    use crate::objects::{NetObject, ObjectKind, TaskInfo};
    use crate::rpc::lookup;
    use shared::MessageWriter;

    const CONTROL: u32 = 100;

    fn fixture_with_players() -> Fixture {
        let mut fixture = Fixture::new();
        let data = fixture.objects.game_data_mut().unwrap();
        data.add_player(0).name = "Owner".into();
        data.add_player(1).name = "Victim".into();
        data.player_mut(0).unwrap().tasks = vec![TaskInfo { id: 1, complete: false }];
        fixture.objects.insert(NetObject::new(
            200,
            STRANGER,
            1,
            ObjectKind::PlayerControl(PlayerControl::new(1, 201, 202)),
        ));
        fixture
    }

    fn owner_control() -> NetObject {
        NetObject::new(CONTROL, OWNER, 1, ObjectKind::PlayerControl(PlayerControl::new(0, 101, 102)))
    }

    fn call(
        fixture: &mut Fixture,
        object: &mut NetObject,
        sender: i32,
        target: Option<i32>,
        call: u8,
        body: impl FnOnce(&mut MessageWriter),
    ) -> HandleResult {
        let bytes = payload(body);
        let mut reader = MessageReader::new(2, &bytes);
        let mut ctx = fixture.ctx(sender, OWNER, target);
        ctx.net_id = object.net_id;
        object.handle_rpc(&mut ctx, call, &mut reader)
    }

    /// A valid body for every known call
    fn body_for(call: u8) -> impl FnOnce(&mut MessageWriter) {
        move |writer: &mut MessageWriter| match call {
            calls::PLAY_ANIMATION | calls::CHECK_COLOR | calls::SET_COLOR => writer.write_u8(1),
            calls::REPORT_DEAD_BODY | calls::START_MEETING => writer.write_u8(u8::MAX),
            calls::COMPLETE_TASK => writer.write_packed_u32(0),
            calls::SYNC_SETTINGS => writer.write_bytes_and_size(&GameOptions {
                impostors: 3,
                ..GameOptions::default()
            }.to_bytes()),
            calls::CHECK_NAME | calls::SET_NAME | calls::SET_HAT | calls::SET_SKIN
            | calls::SET_PET | calls::SEND_CHAT | calls::SET_ROLE => writer.write_string("Changed"),
            calls::SERVER_MODS => writer.write_string("[\"a\"]"),
            calls::MURDER_PLAYER => writer.write_packed_u32(200),
            calls::SET_SCANNER => {
                writer.write_bool(true);
                writer.write_u8(1);
            }
            calls::SEND_CHAT_NOTE => {
                writer.write_u8(0);
                writer.write_u8(0);
            }
            calls::SET_START_COUNTER => {
                writer.write_packed_u32(1);
                writer.write_u8(5);
            }
            calls::ROLE_RPC => writer.write_i32(1),
            _ => {}
        }
    }

    #[test]
    fn test_every_rule_rejects_strangers_without_mutation() {
        for rule in RULES {
            let mut fixture = fixture_with_players();
            fixture.state = GameState::Starting;
            let before_objects = fixture.objects.clone();
            let before_options = fixture.options.clone();
            let mut object = owner_control();
            let target = (rule.target == TargetRule::Host).then_some(HOST);

            let result = call(&mut fixture, &mut object, STRANGER, target, rule.call, body_for(rule.call));

            assert!(result.unwrap_err().is_cheat(), "{} accepted a stranger", rule.name);
            assert_eq!(fixture.objects.player_info(0), before_objects.player_info(0), "{}", rule.name);
            assert_eq!(fixture.objects.player_info(1), before_objects.player_info(1), "{}", rule.name);
            assert_eq!(fixture.options, before_options, "{}", rule.name);
            assert_eq!(fixture.state, GameState::Starting, "{}", rule.name);
            assert_eq!(object, owner_control(), "{}", rule.name);
        }
    }

    #[test]
    fn test_host_rules_reject_owner() {
        for rule in RULES.iter().filter(|rule| rule.sender == Host) {
            let mut fixture = fixture_with_players();
            let mut object = owner_control();

            let result = call(&mut fixture, &mut object, OWNER, None, rule.call, body_for(rule.call));
            assert_eq!(
                result.unwrap_err().to_string(),
                format!("Client sent {} but was not a host", rule.name)
            );
            assert_eq!(fixture.options, GameOptions::default());
        }
    }

    #[test]
    fn test_allowed_senders_are_accepted() {
        for rule in RULES {
            let sender = match rule.sender {
                Host | HostIfSupported => HOST,
                _ => OWNER,
            };
            if rule.sender == HostAndOwner {
                // Only possible when the host owns the character
                continue;
            }
            let mut fixture = fixture_with_players();
            let mut object = owner_control();
            let target = (rule.target == TargetRule::Host).then_some(HOST);

            let result = call(&mut fixture, &mut object, sender, target, rule.call, body_for(rule.call));
            assert!(result.is_ok(), "{} rejected: {:?}", rule.name, result);
        }
    }

    #[test]
    fn test_broadcast_rules_reject_unicast() {
        for rule in RULES.iter().filter(|rule| rule.target == Broadcast) {
            let mut fixture = fixture_with_players();
            let mut object = owner_control();

            let result = call(&mut fixture, &mut object, HOST, Some(OWNER), rule.call, body_for(rule.call));
            assert!(result.is_err(), "{} accepted unicast", rule.name);
        }
    }

    #[test]
    fn test_cosmetics_update_player_info() {
        let mut fixture = fixture_with_players();
        let mut object = owner_control();

        call(&mut fixture, &mut object, OWNER, None, calls::SET_NAME, |w| w.write_string("Blue")).unwrap();
        call(&mut fixture, &mut object, OWNER, None, calls::SET_COLOR, |w| w.write_u8(1)).unwrap();
        call(&mut fixture, &mut object, OWNER, None, calls::SET_HAT, |w| w.write_string("hat")).unwrap();

        let info = fixture.objects.player_info(0).unwrap();
        assert_eq!(info.name, "Blue");
        assert_eq!(info.color, 1);
        assert_eq!(info.hat, "hat");
    }

    #[test]
    fn test_murder_kills_once() {
        let mut fixture = fixture_with_players();
        let mut events = fixture.events.subscribe();
        let mut object = owner_control();

        call(&mut fixture, &mut object, HOST, None, calls::MURDER_PLAYER, |w| w.write_packed_u32(200)).unwrap();
        let victim = fixture.objects.player_info(1).unwrap();
        assert!(victim.is_dead);
        assert_eq!(victim.death_reason, Some(DeathReason::Kill));
        assert!(fixture.objects.player_info(0).unwrap().last_murder.is_some());
        assert!(matches!(events.try_recv().unwrap(), GameEvent::PlayerMurder { victim: 1, .. }));

        call(&mut fixture, &mut object, HOST, None, calls::MURDER_PLAYER, |w| w.write_packed_u32(200)).unwrap();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_murder_by_owner_depends_on_host_version() {
        let mut fixture = fixture_with_players();
        let mut object = owner_control();

        let result = call(&mut fixture, &mut object, OWNER, None, calls::MURDER_PLAYER, |w| w.write_packed_u32(200));
        assert!(result.unwrap_err().is_cheat());
        assert!(!fixture.objects.player_info(1).unwrap().is_dead);

        fixture.host_supported = false;
        call(&mut fixture, &mut object, OWNER, None, calls::MURDER_PLAYER, |w| w.write_packed_u32(200)).unwrap();
        assert!(fixture.objects.player_info(1).unwrap().is_dead);
    }

    #[test]
    fn test_murder_of_unknown_object_is_cancelled() {
        let mut fixture = fixture_with_players();
        let mut object = owner_control();

        let result = call(&mut fixture, &mut object, HOST, None, calls::MURDER_PLAYER, |w| w.write_packed_u32(999));
        assert!(matches!(result, Err(HandleError::Cancel(_))));
    }

    #[test]
    fn test_send_chat_has_no_host_exemption() {
        let mut fixture = fixture_with_players();
        let mut object = owner_control();

        let result = call(&mut fixture, &mut object, HOST, None, calls::SEND_CHAT, |w| w.write_string("hi"));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Client sent SendChat to an unowned PlayerControl"
        );
    }

    #[test]
    fn test_chat_note_type_is_checked() {
        let mut fixture = fixture_with_players();
        let mut object = NetObject::new(CONTROL, HOST, 1, ObjectKind::PlayerControl(PlayerControl::new(0, 101, 102)));
        let bytes = payload(|w| {
            w.write_u8(0);
            w.write_u8(9);
        });
        let mut reader = MessageReader::new(2, &bytes);
        let mut ctx = fixture.ctx(HOST, HOST, None);

        let result = object.handle_rpc(&mut ctx, calls::SEND_CHAT_NOTE, &mut reader);
        assert!(result.unwrap_err().is_cheat());
    }

    #[test]
    fn test_set_role_and_start_game() {
        let mut fixture = fixture_with_players();
        fixture.state = GameState::Starting;
        let mut object = owner_control();

        call(&mut fixture, &mut object, HOST, None, calls::SET_ROLE, |w| w.write_string("ImpostorRole")).unwrap();
        assert_eq!(fixture.objects.player_info(0).unwrap().role_name, "ImpostorRole");

        call(&mut fixture, &mut object, HOST, None, calls::START_GAME, |_| {}).unwrap();
        assert_eq!(fixture.state, GameState::Started);
    }

    #[test]
    fn test_sync_settings_replaces_options() {
        let mut fixture = fixture_with_players();
        let mut object = owner_control();

        call(&mut fixture, &mut object, HOST, None, calls::SYNC_SETTINGS, body_for(calls::SYNC_SETTINGS)).unwrap();
        assert_eq!(fixture.options.impostors, 3);
    }

    #[test]
    fn test_complete_task() {
        let mut fixture = fixture_with_players();
        let mut object = owner_control();

        call(&mut fixture, &mut object, OWNER, None, calls::COMPLETE_TASK, |w| w.write_packed_u32(0)).unwrap();
        assert!(fixture.objects.player_info(0).unwrap().tasks[0].complete);

        // Out of range indices are ignored
        call(&mut fixture, &mut object, OWNER, None, calls::COMPLETE_TASK, |w| w.write_packed_u32(5)).unwrap();
    }

    #[test]
    fn test_server_mods_fallback() {
        assert_eq!(parse_mods("[\"a\",\"b\"]"), vec!["a", "b"]);
        assert_eq!(parse_mods("null"), vec!["nomods"]);
        assert_eq!(parse_mods("not json"), vec!["nomods"]);
    }

    #[test]
    fn test_deserialize_is_host_only() {
        let mut fixture = Fixture::new();
        let mut control = PlayerControl::new(UNASSIGNED, 1, 2);
        let bytes = payload(|w| {
            w.write_bool(true);
            w.write_u8(3);
        });

        let mut reader = MessageReader::new(1, &bytes);
        assert!(control
            .deserialize(&mut fixture.ctx(OWNER, OWNER, None), &mut reader, true)
            .unwrap_err()
            .is_cheat());

        let mut reader = MessageReader::new(1, &bytes);
        control
            .deserialize(&mut fixture.ctx(HOST, OWNER, None), &mut reader, true)
            .unwrap();
        assert!(control.is_new);
        assert_eq!(control.player_id, 3);
    }

    #[test]
    fn test_rule_table_has_unique_calls() {
        for rule in RULES {
            assert_eq!(lookup(RULES, rule.call), Some(rule));
        }
    }
}
