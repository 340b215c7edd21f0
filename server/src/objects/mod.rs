//! Networked objects mirrored from the host
//!
//! A game owns every object in its [`ObjectRegistry`], keyed by network id.
//! Objects never point at their game; handlers receive an [`RpcContext`] that
//! borrows the parts of the game they are allowed to touch for the duration
//! of one call.

pub mod game_data;
pub mod network_transform;
pub mod player_control;
pub mod player_physics;
pub mod ship_status;

pub use game_data::{GameData, PlayerInfo, TaskInfo};
pub use network_transform::NetworkTransform;
pub use player_control::PlayerControl;
pub use player_physics::PlayerPhysics;
pub use ship_status::ShipStatus;

use crate::error::{HandleError, HandleResult};
use crate::events::{EventBus, GameEvent};
use crate::game::GameState;
use crate::rpc::{self, CallShape, RpcRule};
use shared::{GameCode, GameOptions, MessageReader, MessageWriter};
use std::collections::HashMap;

/// A player as seen by one call: who they are and whether they host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub client_id: i32,
    pub is_host: bool,
}

/// Everything a handler may read or change while processing one call
pub struct RpcContext<'a> {
    pub code: GameCode,
    pub sender: Peer,
    /// `None` when the enclosing message was a broadcast
    pub target: Option<Peer>,
    pub host_supported: bool,
    /// Network id of the object handling the call
    pub net_id: u32,
    pub owner_id: i32,
    pub state: &'a mut GameState,
    pub options: &'a mut GameOptions,
    /// Every other object in the game; the handling object is not in here
    pub objects: &'a mut ObjectRegistry,
    pub events: &'a EventBus,
}

impl RpcContext<'_> {
    pub fn is_owner(&self) -> bool {
        self.sender.client_id == self.owner_id
    }

    pub fn shape(&self) -> CallShape {
        CallShape {
            sender_is_host: self.sender.is_host,
            sender_is_owner: self.is_owner(),
            target_is_host: self.target.map(|target| target.is_host),
            host_supported: self.host_supported,
        }
    }

    pub fn player_info_mut(&mut self, player_id: u8) -> Option<&mut PlayerInfo> {
        self.objects.player_info_mut(player_id)
    }

    pub fn publish(&self, event: GameEvent) {
        self.events.publish(event);
    }

    pub(crate) fn require_host(&self, object: &str) -> HandleResult {
        if self.sender.is_host {
            Ok(())
        } else {
            Err(HandleError::cheat(format!(
                "Client attempted to send data for {} as non-host",
                object
            )))
        }
    }
}

/// Behaviour shared by every networked object
pub trait InnerNetObject {
    fn name(&self) -> &'static str;

    /// Calls this object understands and who may make them
    fn rpc_rules(&self) -> &'static [RpcRule];

    /// Runs a call that already passed its rule check
    fn handle_rpc(
        &mut self,
        ctx: &mut RpcContext<'_>,
        call: u8,
        reader: &mut MessageReader<'_>,
    ) -> HandleResult;

    /// Host-authoritative objects are never re-serialized by the server
    fn serialize(&self, _writer: &mut MessageWriter, _initial: bool) -> HandleResult {
        Err(HandleError::internal(format!(
            "{} cannot be serialized",
            self.name()
        )))
    }

    fn deserialize(
        &mut self,
        ctx: &mut RpcContext<'_>,
        reader: &mut MessageReader<'_>,
        initial: bool,
    ) -> HandleResult;
}

/// Objects the server tracks for ownership only; their state is opaque
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passive {
    name: &'static str,
}

impl Passive {
    pub const MEETING_HUD: Self = Self { name: "MeetingHud" };
    pub const LOBBY_BEHAVIOUR: Self = Self {
        name: "LobbyBehaviour",
    };
    pub const VOTE_BAN_SYSTEM: Self = Self {
        name: "VoteBanSystem",
    };
}

impl InnerNetObject for Passive {
    fn name(&self) -> &'static str {
        self.name
    }

    fn rpc_rules(&self) -> &'static [RpcRule] {
        &[]
    }

    fn handle_rpc(
        &mut self,
        _ctx: &mut RpcContext<'_>,
        _call: u8,
        _reader: &mut MessageReader<'_>,
    ) -> HandleResult {
        Ok(())
    }

    fn deserialize(
        &mut self,
        ctx: &mut RpcContext<'_>,
        _reader: &mut MessageReader<'_>,
        _initial: bool,
    ) -> HandleResult {
        ctx.require_host(self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    PlayerControl(PlayerControl),
    PlayerPhysics(PlayerPhysics),
    NetworkTransform(NetworkTransform),
    GameData(GameData),
    ShipStatus(ShipStatus),
    Passive(Passive),
}

impl ObjectKind {
    pub fn inner(&self) -> &dyn InnerNetObject {
        match self {
            ObjectKind::PlayerControl(object) => object,
            ObjectKind::PlayerPhysics(object) => object,
            ObjectKind::NetworkTransform(object) => object,
            ObjectKind::GameData(object) => object,
            ObjectKind::ShipStatus(object) => object,
            ObjectKind::Passive(object) => object,
        }
    }

    pub fn inner_mut(&mut self) -> &mut dyn InnerNetObject {
        match self {
            ObjectKind::PlayerControl(object) => object,
            ObjectKind::PlayerPhysics(object) => object,
            ObjectKind::NetworkTransform(object) => object,
            ObjectKind::GameData(object) => object,
            ObjectKind::ShipStatus(object) => object,
            ObjectKind::Passive(object) => object,
        }
    }
}

/// A spawned object and the bookkeeping the server keeps for it
#[derive(Debug, Clone, PartialEq)]
pub struct NetObject {
    pub net_id: u32,
    /// Owning client, or the host's fake id for global objects
    pub owner_id: i32,
    pub spawn_flags: u8,
    pub kind: ObjectKind,
}

impl NetObject {
    pub fn new(net_id: u32, owner_id: i32, spawn_flags: u8, kind: ObjectKind) -> Self {
        Self {
            net_id,
            owner_id,
            spawn_flags,
            kind,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.inner().name()
    }

    pub fn handle_rpc(
        &mut self,
        ctx: &mut RpcContext<'_>,
        call: u8,
        reader: &mut MessageReader<'_>,
    ) -> HandleResult {
        rpc::dispatch(self.kind.inner_mut(), ctx, call, reader)
    }

    pub fn deserialize(
        &mut self,
        ctx: &mut RpcContext<'_>,
        reader: &mut MessageReader<'_>,
        initial: bool,
    ) -> HandleResult {
        self.kind.inner_mut().deserialize(ctx, reader, initial)
    }

    pub fn serialize(&self, writer: &mut MessageWriter, initial: bool) -> HandleResult {
        self.kind.inner().serialize(writer, initial)
    }

    pub fn as_player_control(&self) -> Option<&PlayerControl> {
        match &self.kind {
            ObjectKind::PlayerControl(control) => Some(control),
            _ => None,
        }
    }
}

/// Every live object of one game, keyed by network id
#[derive(Debug, Default, Clone)]
pub struct ObjectRegistry {
    objects: HashMap<u32, NetObject>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, net_id: u32) -> bool {
        self.objects.contains_key(&net_id)
    }

    pub fn get(&self, net_id: u32) -> Option<&NetObject> {
        self.objects.get(&net_id)
    }

    pub fn insert(&mut self, object: NetObject) {
        self.objects.insert(object.net_id, object);
    }

    /// Removes an object; used both for despawns and to lend an object out
    /// while it handles a call
    pub fn take(&mut self, net_id: u32) -> Option<NetObject> {
        self.objects.remove(&net_id)
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Network ids of everything the client owns
    pub fn owned_by(&self, client_id: i32) -> Vec<u32> {
        let mut owned: Vec<u32> = self
            .objects
            .values()
            .filter(|object| object.owner_id == client_id)
            .map(|object| object.net_id)
            .collect();
        owned.sort_unstable();
        owned
    }

    pub fn player_control(&self, net_id: u32) -> Option<&PlayerControl> {
        self.objects.get(&net_id)?.as_player_control()
    }

    /// Every character as (net id, owner, control)
    pub fn player_controls(&self) -> impl Iterator<Item = (u32, i32, &PlayerControl)> {
        self.objects.values().filter_map(|object| {
            object
                .as_player_control()
                .map(|control| (object.net_id, object.owner_id, control))
        })
    }

    pub fn game_data(&self) -> Option<&GameData> {
        self.objects.values().find_map(|object| match &object.kind {
            ObjectKind::GameData(data) => Some(data),
            _ => None,
        })
    }

    pub fn game_data_mut(&mut self) -> Option<&mut GameData> {
        self.objects
            .values_mut()
            .find_map(|object| match &mut object.kind {
                ObjectKind::GameData(data) => Some(data),
                _ => None,
            })
    }

    pub fn player_info(&self, player_id: u8) -> Option<&PlayerInfo> {
        self.game_data()?.player(player_id)
    }

    pub fn player_info_mut(&mut self, player_id: u8) -> Option<&mut PlayerInfo> {
        self.game_data_mut()?.player_mut(player_id)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Builds call contexts without a full game around them

    use super::*;

    pub const HOST: i32 = 1;
    pub const OWNER: i32 = 2;
    pub const STRANGER: i32 = 3;

    pub struct Fixture {
        pub state: GameState,
        pub options: GameOptions,
        pub objects: ObjectRegistry,
        pub events: EventBus,
        pub host_supported: bool,
    }

    impl Fixture {
        pub fn new() -> Self {
            let mut objects = ObjectRegistry::new();
            objects.insert(NetObject::new(
                1,
                shared::FAKE_CLIENT_ID,
                0,
                ObjectKind::GameData(GameData::new()),
            ));
            Self {
                state: GameState::NotStarted,
                options: GameOptions::default(),
                objects,
                events: EventBus::new(),
                host_supported: true,
            }
        }

        /// Context for a call from `sender` to an object owned by `owner`
        pub fn ctx(&mut self, sender: i32, owner: i32, target: Option<i32>) -> RpcContext<'_> {
            let peer = |client_id: i32| Peer {
                client_id,
                is_host: client_id == HOST,
            };
            RpcContext {
                code: GameCode::new(7),
                sender: peer(sender),
                target: target.map(peer),
                host_supported: self.host_supported,
                net_id: 100,
                owner_id: owner,
                state: &mut self.state,
                options: &mut self.options,
                objects: &mut self.objects,
                events: &self.events,
            }
        }
    }

    /// Body of an rpc message, ready to be read back
    pub fn payload(write: impl FnOnce(&mut MessageWriter)) -> Vec<u8> {
        let mut writer = MessageWriter::new();
        write(&mut writer);
        writer.into_bytes()
    }
}
