//! Processing of `GameData`/`GameDataTo` payloads

use super::{Game, LimboState};
use crate::error::{HandleError, HandleResult};
use crate::events::GameEvent;
use crate::objects::player_control::UNASSIGNED;
use crate::objects::ship_status::Map;
use crate::objects::{
    GameData, NetObject, NetworkTransform, ObjectKind, Passive, Peer, PlayerControl,
    PlayerPhysics, RpcContext, ShipStatus,
};
use log::{debug, info, trace, warn};
use shared::protocol::{GameDataTag, SpawnType};
use shared::{MessageReader, FAKE_CLIENT_ID};

/// Components created by one spawn record, in wire order
fn components(spawn_type: SpawnType) -> Vec<ObjectKind> {
    match spawn_type {
        SpawnType::MeetingHud => vec![ObjectKind::Passive(Passive::MEETING_HUD)],
        SpawnType::LobbyBehaviour => vec![ObjectKind::Passive(Passive::LOBBY_BEHAVIOUR)],
        SpawnType::GameData => vec![
            ObjectKind::GameData(GameData::new()),
            ObjectKind::Passive(Passive::VOTE_BAN_SYSTEM),
        ],
        SpawnType::PlayerControl => vec![
            ObjectKind::PlayerControl(PlayerControl::new(UNASSIGNED, 0, 0)),
            ObjectKind::PlayerPhysics(PlayerPhysics::new()),
            ObjectKind::NetworkTransform(NetworkTransform::new()),
        ],
        ship => Map::from_spawn_type(ship)
            .map(|map| vec![ObjectKind::ShipStatus(ShipStatus::new(map))])
            .unwrap_or_default(),
    }
}

impl Game {
    /// Applies every sub-message of a game data payload in order. The caller
    /// rebroadcasts the original bytes once this succeeds.
    pub fn handle_game_data(
        &mut self,
        sender_id: i32,
        target_id: Option<i32>,
        reader: &mut MessageReader<'_>,
    ) -> HandleResult {
        let target = match target_id {
            Some(id) if !self.contains(id) => {
                return Err(HandleError::cancel(format!(
                    "GameDataTo target {} is not in game {}",
                    id, self.code
                )));
            }
            Some(id) => Some(self.peer(id)),
            None => None,
        };
        let sender = self.peer(sender_id);

        while !reader.is_exhausted() {
            let mut message = reader.read_message()?;
            trace!("Game data {} from client {}", message.tag(), sender_id);

            match GameDataTag::from_u8(message.tag()) {
                Some(GameDataTag::Data) => {
                    let net_id = message.read_packed_u32()?;
                    self.with_object(sender, target, net_id, |object, ctx| {
                        object.deserialize(ctx, &mut message, false)
                    })?;
                }
                Some(GameDataTag::Rpc) => {
                    let net_id = message.read_packed_u32()?;
                    let call = message.read_u8()?;
                    self.with_object(sender, target, net_id, |object, ctx| {
                        object.handle_rpc(ctx, call, &mut message)
                    })?;
                }
                Some(GameDataTag::Spawn) => self.handle_spawn(sender, target, &mut message)?,
                Some(GameDataTag::Despawn) => self.handle_despawn(sender, &mut message)?,
                Some(GameDataTag::SceneChange) => {
                    let client_id = message.read_packed_i32()?;
                    if client_id != sender_id {
                        return Err(HandleError::cheat(
                            "Client attempted to change the scene of another player",
                        ));
                    }

                    let scene = message.read_string()?;
                    if let Some(session) = self.session_mut(sender_id) {
                        debug!("Client {} changed scene to {}", sender_id, scene);
                        session.scene = Some(scene);
                        session.advance(LimboState::Spawning);
                    }
                }
                Some(GameDataTag::Ready) => {
                    let client_id = message.read_packed_i32()?;
                    debug!("Client {} is ready", client_id);
                }
                None => warn!(
                    "Client {} sent unknown game data tag {}",
                    sender_id,
                    message.tag()
                ),
            }
        }

        self.refresh_spawn_states();
        Ok(())
    }

    /// Lends an object out of the registry for one call. Unknown ids are
    /// skipped; objects routinely vanish while traffic for them is in flight.
    fn with_object(
        &mut self,
        sender: Peer,
        target: Option<Peer>,
        net_id: u32,
        run: impl FnOnce(&mut NetObject, &mut RpcContext<'_>) -> HandleResult,
    ) -> HandleResult {
        let Some(mut object) = self.objects.take(net_id) else {
            debug!("No object with net id {} in game {}", net_id, self.code);
            return Ok(());
        };

        let result = self.run_with(sender, target, &mut object, run);
        self.objects.insert(object);
        result
    }

    fn run_with(
        &mut self,
        sender: Peer,
        target: Option<Peer>,
        object: &mut NetObject,
        run: impl FnOnce(&mut NetObject, &mut RpcContext<'_>) -> HandleResult,
    ) -> HandleResult {
        let mut ctx = RpcContext {
            code: self.code,
            sender,
            target,
            host_supported: self.host_supported(),
            net_id: object.net_id,
            owner_id: object.owner_id,
            state: &mut self.state,
            options: &mut self.options,
            objects: &mut self.objects,
            events: &self.events,
        };
        run(object, &mut ctx)
    }

    fn handle_spawn(
        &mut self,
        sender: Peer,
        target: Option<Peer>,
        reader: &mut MessageReader<'_>,
    ) -> HandleResult {
        if !sender.is_host {
            return Err(HandleError::cheat(
                "Client attempted to spawn an object as non-host",
            ));
        }

        let spawn_id = reader.read_packed_u32()?;
        let owner_id = reader.read_packed_i32()?;
        let flags = reader.read_u8()?;
        let count = reader.read_packed_u32()?;

        if owner_id != FAKE_CLIENT_ID && !self.contains(owner_id) {
            debug!("Spawn for client {} who is not in the game", owner_id);
            return Ok(());
        }

        let Some(spawn_type) = u8::try_from(spawn_id).ok().and_then(SpawnType::from_u8) else {
            warn!("Host spawned unknown object type {}", spawn_id);
            return Ok(());
        };
        let kinds = components(spawn_type);
        if kinds.len() != count as usize {
            warn!(
                "Spawn of {:?} declared {} components, expected {}",
                spawn_type,
                count,
                kinds.len()
            );
            return Ok(());
        }

        let mut spawned: Vec<NetObject> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let net_id = reader.read_packed_u32()?;
            let mut state = reader.read_message()?;

            if self.objects.contains(net_id) || spawned.iter().any(|object| object.net_id == net_id) {
                return Err(HandleError::cheat(format!(
                    "Client attempted to spawn over live net id {}",
                    net_id
                )));
            }

            let mut object = NetObject::new(net_id, owner_id, flags, kind);
            self.run_with(sender, target, &mut object, |object, ctx| {
                object.deserialize(ctx, &mut state, true)
            })?;
            spawned.push(object);
        }

        if spawn_type == SpawnType::PlayerControl {
            self.spawn_character(owner_id, spawned)
        } else {
            debug!("Spawned {:?} in game {}", spawn_type, self.code);
            for object in spawned {
                self.objects.insert(object);
            }
            Ok(())
        }
    }

    /// Registers a character and links its components and owner to it
    fn spawn_character(&mut self, owner_id: i32, mut parts: Vec<NetObject>) -> HandleResult {
        let [control, physics, transform] = parts.as_mut_slice() else {
            return Err(HandleError::internal("character spawned without three components"));
        };
        let ObjectKind::PlayerControl(player) = &mut control.kind else {
            return Err(HandleError::internal("character spawned without a PlayerControl"));
        };
        player.physics_net_id = physics.net_id;
        player.transform_net_id = transform.net_id;
        let player_id = player.player_id;
        let control_id = control.net_id;

        let Some(session) = self.session(owner_id) else {
            return Err(HandleError::cheat(
                "Client attempted to spawn a character without an owner",
            ));
        };
        if session
            .character
            .is_some_and(|existing| self.objects.contains(existing))
        {
            return Err(HandleError::cheat(format!(
                "Client attempted to spawn a second character for client {}",
                owner_id
            )));
        }
        if self
            .objects
            .player_controls()
            .any(|(_, owner, other)| other.player_id == player_id && owner != owner_id)
        {
            return Err(HandleError::cheat(format!(
                "Client attempted to spawn a character with taken player id {}",
                player_id
            )));
        }

        for object in parts {
            self.objects.insert(object);
        }
        if let Some(data) = self.objects.game_data_mut() {
            data.add_player(player_id);
        }
        if let Some(session) = self.session_mut(owner_id) {
            session.character = Some(control_id);
            session.advance(LimboState::Spawning);
        }

        info!(
            "Character {} (player {}) spawned for client {} in game {}",
            control_id, player_id, owner_id, self.code
        );
        Ok(())
    }

    fn handle_despawn(&mut self, sender: Peer, reader: &mut MessageReader<'_>) -> HandleResult {
        let net_id = reader.read_packed_u32()?;
        let Some(object) = self.objects.get(net_id) else {
            debug!("Despawn of unknown net id {}", net_id);
            return Ok(());
        };

        if !sender.is_host && object.owner_id != sender.client_id {
            return Err(HandleError::cheat(format!(
                "Client attempted to despawn unowned {}",
                object.name()
            )));
        }

        let Some(object) = self.objects.take(net_id) else {
            return Ok(());
        };
        if let ObjectKind::PlayerControl(control) = &object.kind {
            self.objects.take(control.physics_net_id);
            self.objects.take(control.transform_net_id);

            for session in &mut self.sessions {
                if session.character == Some(net_id) {
                    session.character = None;
                }
            }
        }
        debug!("Despawned {} {} in game {}", object.name(), net_id, self.code);
        Ok(())
    }

    /// Moves sessions whose character has every cosmetic set into the game
    fn refresh_spawn_states(&mut self) {
        let code = self.code;
        let objects = &self.objects;
        let events = &self.events;

        for session in self
            .sessions
            .iter_mut()
            .filter(|session| session.limbo < LimboState::InGame)
        {
            let Some(player_id) = session
                .character
                .and_then(|net_id| objects.player_control(net_id))
                .map(|control| control.player_id)
            else {
                continue;
            };
            let complete = objects
                .player_info(player_id)
                .is_some_and(|info| info.is_spawn_complete());
            if !complete {
                continue;
            }

            session.cancel_spawn_timer();
            session.advance(LimboState::InGame);
            info!("Client {} finished spawning in game {}", session.client_id, code);
            events.publish(GameEvent::PlayerSpawned {
                code,
                client_id: session.client_id,
                player_id,
            });
        }
    }
}
