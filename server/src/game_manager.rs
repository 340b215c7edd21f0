//! Registry of live games, keyed by game code
//!
//! Games remove themselves from the registry when their last player leaves.
//! A game that nobody ever joined has no such trigger, so the manager also
//! remembers which client asked for each game and releases that client's
//! empty games when it hosts again or goes away.

use crate::events::{EventBus, GameEvent};
use crate::game::{Game, GameHandle, GameRegistry, GameState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use shared::version::Compatibility;
use shared::{GameCode, GameListing, GameOptions, GameVersion};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct GameManager {
    games: Arc<GameRegistry>,
    /// Codes each client has created, until released
    hosted: DashMap<i32, Vec<GameCode>>,
    events: EventBus,
    spawn_timeout: Duration,
}

impl GameManager {
    pub fn new(events: EventBus, spawn_timeout: Duration) -> Self {
        Self {
            games: Arc::new(GameRegistry::new()),
            hosted: DashMap::new(),
            events,
            spawn_timeout,
        }
    }

    /// Creates a game under a fresh code. The host's version decides which
    /// clients may join it later.
    pub fn create(&self, options: GameOptions, host_version: GameVersion) -> (GameCode, GameHandle) {
        loop {
            let code = GameCode::random();
            let Entry::Vacant(slot) = self.games.entry(code) else {
                continue;
            };

            let game = Game::create(
                code,
                options,
                host_version.compatibility(),
                self.events.clone(),
                self.spawn_timeout,
                Arc::downgrade(&self.games),
            );
            slot.insert(game.clone());

            info!("Created game {} for version {}", code, host_version);
            self.events.publish(GameEvent::GameCreated { code });
            return (code, game);
        }
    }

    /// Creates a game on behalf of a connected client, which is then
    /// answerable for it until somebody joins
    pub fn create_for(
        &self,
        client_id: i32,
        options: GameOptions,
        host_version: GameVersion,
    ) -> (GameCode, GameHandle) {
        let (code, game) = self.create(options, host_version);
        self.hosted.entry(client_id).or_default().push(code);
        (code, game)
    }

    /// Destroys every game the client created that is still empty and stops
    /// tracking the rest, which now clean up after their own players
    pub async fn release_hosted(&self, client_id: i32) -> usize {
        let Some((_, codes)) = self.hosted.remove(&client_id) else {
            return 0;
        };

        let mut destroyed = 0;
        for code in codes {
            let Some(handle) = self.find(code) else {
                continue;
            };
            if handle.write().await.destroy_if_abandoned() {
                destroyed += 1;
            }
        }

        if destroyed > 0 {
            debug!("Released {} empty game(s) created by client {}", destroyed, client_id);
        }
        destroyed
    }

    pub fn find(&self, code: GameCode) -> Option<GameHandle> {
        self.games.get(&code).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, code: GameCode) -> Option<GameHandle> {
        self.games.remove(&code).map(|(_, game)| game)
    }

    /// Codes of every live game, in a stable order
    pub fn codes(&self) -> Vec<GameCode> {
        let mut codes: Vec<GameCode> = self.games.iter().map(|entry| *entry.key()).collect();
        codes.sort();
        codes
    }

    fn handles(&self) -> Vec<GameHandle> {
        self.games.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Public lobbies a client with the given compatibility could join
    pub async fn listings(&self, compatibility: Compatibility, max: usize) -> Vec<GameListing> {
        let mut listings = Vec::new();

        for handle in self.handles() {
            if listings.len() >= max {
                break;
            }

            let game = handle.read().await;
            let listed = game.is_public()
                && game.state() == GameState::NotStarted
                && game.compatibility() == compatibility
                && game.host_id().is_some();
            if listed {
                listings.push(game.listing());
            }
        }
        listings
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}
