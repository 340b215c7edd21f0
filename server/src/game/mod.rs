//! One match: its roster, its objects and its lifecycle
//!
//! A [`Game`] exclusively owns its [`Session`]s and its [`ObjectRegistry`].
//! Nothing else holds a strong reference into either: sessions and objects
//! are addressed by client id and network id, and the only back-references
//! (from spawn timers and from the game to its registry) are weak.

mod data;
mod join;
pub mod session;

pub use join::{JoinError, Joined};
pub use session::{LimboState, Session};

use crate::events::{EventBus, GameEvent};
use crate::messages;
use crate::objects::player_control::calls as control_calls;
use crate::objects::{ObjectKind, ObjectRegistry, Peer};
use dashmap::DashMap;
use log::{debug, info};
use shared::version::Compatibility;
use shared::{DisconnectReason, GameCode, GameListing, GameOptions, MessageWriter};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub type GameHandle = Arc<RwLock<Game>>;
pub type GameRegistry = DashMap<GameCode, GameHandle>;

/// Lifecycle of a game; only moves forward, except `Ended -> NotStarted`
/// when the host comes back for another round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameState {
    NotStarted,
    Starting,
    Started,
    Ended,
    /// Terminal; the game is out of the registry and admits nobody
    Destroyed,
}

#[derive(Debug)]
pub struct Game {
    code: GameCode,
    state: GameState,
    options: GameOptions,
    is_public: bool,
    host_id: Option<i32>,
    compatibility: Compatibility,
    /// Join order; the first entry inherits the host role
    sessions: Vec<Session>,
    objects: ObjectRegistry,
    banned_ips: HashSet<IpAddr>,
    events: EventBus,
    spawn_timeout: Duration,
    registry: Weak<GameRegistry>,
    handle: Weak<RwLock<Game>>,
    next_epoch: u64,
}

impl Game {
    /// Builds a game behind its shared handle. The caller is responsible for
    /// putting the handle into `registry`.
    pub fn create(
        code: GameCode,
        options: GameOptions,
        compatibility: Compatibility,
        events: EventBus,
        spawn_timeout: Duration,
        registry: Weak<GameRegistry>,
    ) -> GameHandle {
        Arc::new_cyclic(|handle| {
            RwLock::new(Game {
                code,
                state: GameState::NotStarted,
                options,
                is_public: false,
                host_id: None,
                compatibility,
                sessions: Vec::new(),
                objects: ObjectRegistry::new(),
                banned_ips: HashSet::new(),
                events,
                spawn_timeout,
                registry,
                handle: handle.clone(),
                next_epoch: 0,
            })
        })
    }

    pub fn code(&self) -> GameCode {
        self.code
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn options(&self) -> &GameOptions {
        &self.options
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    pub fn host_id(&self) -> Option<i32> {
        self.host_id
    }

    pub fn is_host(&self, client_id: i32) -> bool {
        self.host_id == Some(client_id)
    }

    pub fn compatibility(&self) -> Compatibility {
        self.compatibility
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn session(&self, client_id: i32) -> Option<&Session> {
        self.sessions.iter().find(|session| session.client_id == client_id)
    }

    fn session_mut(&mut self, client_id: i32) -> Option<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|session| session.client_id == client_id)
    }

    pub fn contains(&self, client_id: i32) -> bool {
        self.session(client_id).is_some()
    }

    pub fn player_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn is_banned(&self, ip: IpAddr) -> bool {
        self.banned_ips.contains(&ip)
    }

    pub fn ban_ip(&mut self, ip: IpAddr) {
        self.banned_ips.insert(ip);
    }

    /// Whether the host runs a build whose object layouts we understand
    pub fn host_supported(&self) -> bool {
        self.host_id
            .and_then(|id| self.session(id))
            .is_some_and(|host| host.version.is_supported())
    }

    pub fn host_name(&self) -> Option<&str> {
        self.host_id
            .and_then(|id| self.session(id))
            .map(|host| host.name.as_str())
    }

    fn peer(&self, client_id: i32) -> Peer {
        Peer {
            client_id,
            is_host: self.is_host(client_id),
        }
    }

    pub fn send_to_all(&self, bytes: &[u8], reliable: bool) {
        for session in &self.sessions {
            session.connection.send(bytes.to_vec(), reliable);
        }
    }

    pub fn send_to_all_except(&self, except: i32, bytes: &[u8], reliable: bool) {
        for session in self.sessions.iter().filter(|session| session.client_id != except) {
            session.connection.send(bytes.to_vec(), reliable);
        }
    }

    /// Returns false if the client is not in this game
    pub fn send_to(&self, client_id: i32, bytes: &[u8], reliable: bool) -> bool {
        match self.session(client_id) {
            Some(session) => {
                session.connection.send(bytes.to_vec(), reliable);
                true
            }
            None => false,
        }
    }

    fn broadcast(&self, writer: &MessageWriter) {
        self.send_to_all(writer.as_bytes(), true);
    }

    /// Drops a client from the roster, retiring what it owned and electing a
    /// new host if needed. Returns false if the client was not here.
    pub fn remove_player(&mut self, client_id: i32, reason: DisconnectReason) -> bool {
        let Some(index) = self
            .sessions
            .iter()
            .position(|session| session.client_id == client_id)
        else {
            return false;
        };

        let session = self.sessions.remove(index);
        info!(
            "Client {} ({}) left game {}: {:?}",
            client_id, session.name, self.code, reason
        );
        drop(session);

        self.retire_objects(client_id);
        self.events.publish(GameEvent::PlayerLeft {
            code: self.code,
            client_id,
        });

        if self.sessions.is_empty() {
            self.destroy();
            return true;
        }

        let host_id = match self.host_id {
            Some(host_id) if host_id != client_id => host_id,
            _ => self.migrate_host(),
        };

        self.broadcast(&messages::player_removed(
            self.code, client_id, host_id, reason,
        ));
        true
    }

    /// Hands the host role to the longest-present session
    fn migrate_host(&mut self) -> i32 {
        let next = self.sessions[0].client_id;
        self.host_id = Some(next);
        info!("Game {} host migrated to client {}", self.code, next);

        if self.state == GameState::Ended && self.sessions[0].limbo == LimboState::WaitingForHost {
            self.reopen();
        }
        next
    }

    /// Removes every object the client owned; its game data row is freed in
    /// a lobby and kept, marked disconnected, in a running game
    fn retire_objects(&mut self, client_id: i32) {
        let freed_row = matches!(self.state, GameState::NotStarted | GameState::Ended);

        for net_id in self.objects.owned_by(client_id) {
            let Some(object) = self.objects.take(net_id) else {
                continue;
            };
            let ObjectKind::PlayerControl(control) = object.kind else {
                continue;
            };

            let Some(data) = self.objects.game_data_mut() else {
                continue;
            };
            if freed_row {
                data.remove_player(control.player_id);
            } else if let Some(info) = data.player_mut(control.player_id) {
                info.disconnected = true;
            }
        }
    }

    /// Destroys a game nobody ever joined or everyone has left. Returns
    /// whether the game was torn down by this call.
    pub fn destroy_if_abandoned(&mut self) -> bool {
        if !self.sessions.is_empty() || self.state == GameState::Destroyed {
            return false;
        }
        self.destroy();
        true
    }

    fn destroy(&mut self) {
        self.state = GameState::Destroyed;
        self.sessions.clear();
        self.objects.clear();

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.code);
        }
        info!("Game {} destroyed", self.code);
        self.events.publish(GameEvent::GameDestroyed { code: self.code });
    }

    /// Host `StartGame`; the message goes out exactly as received
    pub fn start_game(&mut self, raw: &[u8]) {
        self.state = GameState::Starting;
        self.send_to_all(raw, true);

        info!("Game {} is starting", self.code);
        self.events.publish(GameEvent::GameStarting { code: self.code });
    }

    /// Host `EndGame`; every session goes back to the start of limbo
    pub fn end_game(&mut self, raw: &[u8]) {
        self.state = GameState::Ended;
        self.send_to_all(raw, true);

        for session in &mut self.sessions {
            session.renew();
        }
        self.objects.clear();

        info!("Game {} has ended", self.code);
        self.events.publish(GameEvent::GameEnded { code: self.code });
    }

    pub fn set_public(&mut self, is_public: bool) {
        self.is_public = is_public;
        self.broadcast(&messages::alter_game(self.code, is_public));
    }

    /// Kicks a client, optionally banning its address from this game
    pub fn kick(&mut self, client_id: i32, ban: bool) -> bool {
        let Some(session) = self.session(client_id) else {
            return false;
        };
        let connection = session.connection.clone();

        if ban {
            self.banned_ips.insert(connection.ip());
        }
        self.broadcast(&messages::kick_player(self.code, client_id, ban));

        let reason = if ban {
            DisconnectReason::Banned
        } else {
            DisconnectReason::Kicked
        };
        connection.disconnect(reason, None);
        self.remove_player(client_id, reason)
    }

    /// Kicks with a message shown to the kicked client
    pub fn kick_with_reason(&mut self, client_id: i32, reason: &str) -> bool {
        let Some(session) = self.session(client_id) else {
            return false;
        };
        session
            .connection
            .disconnect(DisconnectReason::Custom, Some(reason.to_string()));
        self.remove_player(client_id, DisconnectReason::Kicked)
    }

    pub fn listing(&self) -> GameListing {
        GameListing::new(
            self.host_name(),
            self.code.value(),
            self.sessions.len(),
            self.options.max_players,
            self.options.impostors,
        )
    }

    /// Shows a chat line to one player, sent as if by their own character
    pub fn send_server_chat(&self, client_id: i32, text: &str) -> bool {
        let Some(net_id) = self.session(client_id).and_then(|session| session.character) else {
            debug!("Client {} has no character to chat through", client_id);
            return false;
        };

        let writer = messages::rpc_to(self.code, client_id, net_id, control_calls::SEND_CHAT, |writer| {
            writer.write_string(text)
        });
        self.send_to(client_id, writer.as_bytes(), true)
    }

    fn next_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    /// Starts the countdown within which the client must finish spawning
    fn arm_spawn_timer(&self, client_id: i32, epoch: u64) -> Option<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let handle = self.handle.clone();
        let timeout = self.spawn_timeout;

        Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(game) = handle.upgrade() {
                game.write().await.on_spawn_timeout(client_id, epoch);
            }
        }))
    }

    /// Runs when a spawn timer fires. Everything may have changed since it
    /// was armed, so each precondition is checked again.
    pub(crate) fn on_spawn_timeout(&mut self, client_id: i32, epoch: u64) {
        if self.state == GameState::Destroyed {
            return;
        }
        let Some(session) = self.session_mut(client_id) else {
            return;
        };
        if session.epoch != epoch || session.limbo == LimboState::InGame {
            return;
        }
        // This call is the timer task itself, so detach rather than abort
        if session.spawn_timer.take().is_none() {
            return;
        }

        info!(
            "Client {} did not spawn in time in game {}, kicking",
            client_id, self.code
        );
        self.kick(client_id, false);
    }
}
