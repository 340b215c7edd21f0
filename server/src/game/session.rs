//! A client's seat inside one game

use crate::client_manager::Client;
use crate::connection::ConnectionHandle;
use shared::GameVersion;
use tokio::task::JoinHandle;

/// Spawn progress of a session, only ever moving forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LimboState {
    PreSpawn,
    NotSpawned,
    Spawning,
    WaitingForHost,
    InGame,
}

#[derive(Debug)]
pub struct Session {
    pub client_id: i32,
    pub name: String,
    pub version: GameVersion,
    pub device_id: String,
    pub connection: ConnectionHandle,
    pub limbo: LimboState,
    /// Network id of the session's PlayerControl
    pub character: Option<u32>,
    pub scene: Option<String>,
    /// Distinguishes this admission from earlier ones, so a timer armed for
    /// a previous round can recognise itself as stale
    pub(crate) epoch: u64,
    pub(crate) spawn_timer: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(client: &Client) -> Self {
        Self {
            client_id: client.id,
            name: client.name.clone(),
            version: client.version,
            device_id: client.device_id.clone(),
            connection: client.connection.clone(),
            limbo: LimboState::PreSpawn,
            character: None,
            scene: None,
            epoch: 0,
            spawn_timer: None,
        }
    }

    /// Moves to `state` if that is further along; returns whether it moved
    pub fn advance(&mut self, state: LimboState) -> bool {
        if state > self.limbo {
            self.limbo = state;
            true
        } else {
            false
        }
    }

    /// Back to the start after a round ends; the only backward transition
    pub(crate) fn renew(&mut self) {
        self.cancel_spawn_timer();
        self.limbo = LimboState::PreSpawn;
        self.character = None;
        self.scene = None;
    }

    pub fn has_spawn_timer(&self) -> bool {
        self.spawn_timer.is_some()
    }

    pub(crate) fn cancel_spawn_timer(&mut self) {
        if let Some(timer) = self.spawn_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel_spawn_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session() -> Session {
        let (connection, _rx) = ConnectionHandle::new("127.0.0.1:9000".parse().unwrap());
        let client = Client::new(1, "Red".into(), GameVersion::new(2024, 6, 22, 0), String::new(), connection);
        Session::new(&client)
    }

    #[test]
    fn test_limbo_only_moves_forward() {
        let mut session = test_session();
        assert_eq!(session.limbo, LimboState::PreSpawn);

        assert!(session.advance(LimboState::Spawning));
        assert!(!session.advance(LimboState::NotSpawned));
        assert_eq!(session.limbo, LimboState::Spawning);

        assert!(session.advance(LimboState::InGame));
        assert!(!session.advance(LimboState::WaitingForHost));
    }

    #[test]
    fn test_renew_resets_spawn_state() {
        let mut session = test_session();
        session.advance(LimboState::InGame);
        session.character = Some(5);

        session.renew();
        assert_eq!(session.limbo, LimboState::PreSpawn);
        assert!(session.character.is_none());
    }

    #[tokio::test]
    async fn test_drop_aborts_timer() {
        let mut session = test_session();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        session.spawn_timer = Some(tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        }));

        drop(session);
        // The sender is dropped only once the task is torn down
        assert!(rx.await.is_err());
    }
}
