//! Admission of clients into a game

use super::{Game, GameState, LimboState, Session};
use crate::client_manager::Client;
use crate::events::GameEvent;
use crate::messages;
use log::info;
use shared::protocol::messages as reasons;
use shared::DisconnectReason;
use thiserror::Error;

/// Successful outcome of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joined {
    Admitted,
    /// The round ended and the host has not come back yet
    WaitingForHost,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("client is already in another game")]
    InvalidClient,
    #[error("client is banned from this game")]
    Banned,
    #[error("game is full")]
    GameFull,
    #[error("client is in an invalid limbo state")]
    InvalidLimbo,
    #[error("game has already started")]
    GameStarted,
    #[error("game is being destroyed")]
    GameDestroyed,
    #[error("{0}")]
    Custom(String),
}

impl JoinError {
    /// Disconnect reason and text shown to the refused client
    pub fn reason(&self) -> (DisconnectReason, Option<String>) {
        let custom = |text: &str| (DisconnectReason::Custom, Some(text.to_string()));
        match self {
            JoinError::InvalidClient => custom(reasons::INVALID_CLIENT),
            JoinError::InvalidLimbo => custom(reasons::INVALID_LIMBO),
            JoinError::GameDestroyed => custom(reasons::DESTROYED),
            JoinError::Custom(text) => custom(text),
            JoinError::Banned => (DisconnectReason::Banned, None),
            JoinError::GameFull => (DisconnectReason::GameFull, None),
            JoinError::GameStarted => (DisconnectReason::GameStarted, None),
        }
    }
}

impl Game {
    /// Resolves a join request. `in_other_game` is whether the client is
    /// still seated in some other live game.
    pub fn add_client(&mut self, client: &Client, in_other_game: bool) -> Result<Joined, JoinError> {
        if self.is_banned(client.connection.ip()) {
            return Err(JoinError::Banned);
        }
        if in_other_game {
            return Err(JoinError::InvalidClient);
        }

        let existing = self.session(client.id).map(|session| session.limbo);
        if existing.is_some_and(|limbo| limbo != LimboState::PreSpawn) {
            return Err(JoinError::InvalidLimbo);
        }

        match self.state {
            GameState::Destroyed => return Err(JoinError::GameDestroyed),
            GameState::Starting | GameState::Started => return Err(JoinError::GameStarted),
            GameState::NotStarted | GameState::Ended => {}
        }

        if existing.is_none() && self.sessions.len() >= usize::from(self.options.max_players) {
            return Err(JoinError::GameFull);
        }
        if client.version.compatibility() != self.compatibility {
            return Err(JoinError::Custom(reasons::INCOMPATIBLE_VERSION.to_string()));
        }

        if existing.is_none() {
            self.sessions.push(Session::new(client));
        }

        if self.state == GameState::Ended {
            if self.is_host(client.id) {
                self.reopen();
                return Ok(Joined::Admitted);
            }

            if let Some(session) = self.session_mut(client.id) {
                session.advance(LimboState::WaitingForHost);
            }
            info!("Client {} is waiting for the host of game {}", client.id, self.code);
            self.broadcast(&messages::wait_for_host(self.code, client.id));
            return Ok(Joined::WaitingForHost);
        }

        self.admit(client.id);
        Ok(Joined::Admitted)
    }

    /// Starts a new round: the host goes first, then everyone who waited
    pub(super) fn reopen(&mut self) {
        self.state = GameState::NotStarted;
        info!("Game {} reopened for another round", self.code);

        let mut ready: Vec<i32> = self
            .sessions
            .iter()
            .filter(|session| {
                self.is_host(session.client_id) || session.limbo == LimboState::WaitingForHost
            })
            .map(|session| session.client_id)
            .collect();
        ready.sort_by_key(|id| !self.is_host(*id));

        for client_id in ready {
            if let Some(session) = self.session_mut(client_id) {
                session.renew();
            }
            self.admit(client_id);
        }
    }

    fn admit(&mut self, client_id: i32) {
        let host_id = *self.host_id.get_or_insert(client_id);
        let epoch = self.next_epoch();
        let timer = self.arm_spawn_timer(client_id, epoch);
        let others: Vec<i32> = self
            .sessions
            .iter()
            .map(|session| session.client_id)
            .filter(|id| *id != client_id)
            .collect();
        let code = self.code;
        let is_public = self.is_public;

        let Some(session) = self.session_mut(client_id) else {
            return;
        };
        session.cancel_spawn_timer();
        session.epoch = epoch;
        session.spawn_timer = timer;
        session.advance(LimboState::NotSpawned);

        session
            .connection
            .send_reliable(messages::joined_game(code, client_id, host_id, &others));
        session
            .connection
            .send_reliable(messages::alter_game(code, is_public));

        let joined = messages::player_joined(code, client_id, host_id);
        self.send_to_all_except(client_id, joined.as_bytes(), true);

        info!("Client {} joined game {}", client_id, code);
        self.events.publish(GameEvent::PlayerJoined { code, client_id });
    }
}
