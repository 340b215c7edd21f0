//! Gameplay events published for outside consumers

use log::info;
use shared::GameCode;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    GameCreated { code: GameCode },
    GameStarting { code: GameCode },
    GameStarted { code: GameCode },
    GameEnded { code: GameCode },
    GameDestroyed { code: GameCode },
    PlayerJoined { code: GameCode, client_id: i32 },
    PlayerLeft { code: GameCode, client_id: i32 },
    PlayerSpawned { code: GameCode, client_id: i32, player_id: u8 },
    PlayerChat { code: GameCode, client_id: i32, message: String },
    PlayerMurder { code: GameCode, client_id: i32, victim: u8 },
    PlayerExile { code: GameCode, player_id: u8 },
    TaskCompleted { code: GameCode, client_id: i32, task_index: u32 },
    MeetingStarted { code: GameCode, client_id: i32, body: Option<u8> },
    PlayerVent { code: GameCode, client_id: i32, vent_id: u32, entered: bool },
    StartCounter { code: GameCode, client_id: i32, seconds_left: u8 },
}

/// Fan-out of [`GameEvent`]s; publishing never blocks or fails
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GameEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: GameEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.sender.subscribe()
    }
}

/// Logs every event until the bus closes
pub async fn log_events(mut receiver: broadcast::Receiver<GameEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => info!("Event: {:?}", event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                info!("Event logger skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
