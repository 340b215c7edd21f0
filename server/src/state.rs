//! Everything a connection task needs, shared behind one `Arc`

use crate::ban_manager::BanManager;
use crate::client_manager::ClientManager;
use crate::config::Config;
use crate::events::EventBus;
use crate::game_manager::GameManager;

#[derive(Debug)]
pub struct ServerState {
    pub config: Config,
    pub clients: ClientManager,
    pub games: GameManager,
    pub bans: BanManager,
    pub events: EventBus,
}

impl ServerState {
    pub fn new(config: Config, bans: BanManager) -> Self {
        let events = EventBus::new();
        let games = GameManager::new(events.clone(), config.spawn_timeout());

        Self {
            config,
            clients: ClientManager::new(),
            games,
            bans,
            events,
        }
    }
}
