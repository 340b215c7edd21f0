//! Registry of connected clients for the game server
//!
//! This module handles the server-side bookkeeping for every client that has
//! completed the handshake, including:
//! - Client id assignment (monotonic, wrapping back to 1 on overflow)
//! - Display name validation before registration
//! - Lookup by id or network address
//! - Tracking which game (if any) a client last joined
//!
//! The registry is shared by every connection task, so it is backed by a
//! concurrent map and never needs an outer lock.

use crate::connection::ConnectionHandle;
use dashmap::DashMap;
use log::{info, trace};
use shared::protocol::messages;
use shared::{GameCode, GameVersion, MAX_NAME_LENGTH};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};

/// Represents a client that completed the handshake
///
/// Each client maintains:
/// - Identity presented at connect time (name, version, device id)
/// - The connection handle used to reach it
/// - The game it was last admitted to, if any
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: i32,
    /// Display name from the handshake
    pub name: String,
    /// Protocol version from the handshake
    pub version: GameVersion,
    /// Hardware identifier; empty for legacy clients
    pub device_id: String,
    /// Outbound channel to the remote peer
    pub connection: ConnectionHandle,
    /// Game the client was last admitted to
    pub game: Option<GameCode>,
}

impl Client {
    /// Creates a client that is not yet part of any game
    pub fn new(
        id: i32,
        name: String,
        version: GameVersion,
        device_id: String,
        connection: ConnectionHandle,
    ) -> Self {
        Self {
            id,
            name,
            version,
            device_id,
            connection,
            game: None,
        }
    }

    /// Network address of the remote peer
    pub fn addr(&self) -> SocketAddr {
        self.connection.addr()
    }
}

/// Characters accepted in display names besides letters and digits
const NAME_PUNCTUATION: &str = " .,!?-_'";

/// Checks a display name against the rules the game client itself enforces
///
/// Returns the rejection message to send back when the name is refused.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(messages::INVALID_NAME);
    }

    let allowed = |c: char| c.is_alphanumeric() || NAME_PUNCTUATION.contains(c);
    if name.trim().is_empty() || !name.chars().all(allowed) {
        return Err(messages::INVALID_NAME);
    }

    Ok(())
}

/// Manages all clients that completed the handshake
///
/// The ClientManager hands out client ids and is the authority on whether a
/// given id still refers to a live client. Removal happens exactly once, when
/// the transport reports the connection closed.
#[derive(Debug, Default)]
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: DashMap<i32, Client>,
    /// Last id handed out
    last_id: AtomicI32,
}

impl ClientManager {
    /// Creates an empty client registry
    ///
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next client id
    ///
    /// Ids only ever grow; on overflow the counter restarts so that ids stay
    /// positive.
    pub fn next_id(&self) -> i32 {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        if id >= 1 {
            return id;
        }

        // Overflowed into the negative range
        self.last_id.store(1, Ordering::SeqCst);
        1
    }

    /// Registers a client after a successful handshake
    ///
    /// Validates the display name first and returns the rejection message if
    /// it is not acceptable. On success the new client id is returned.
    pub fn register(
        &self,
        connection: ConnectionHandle,
        name: &str,
        version: GameVersion,
        device_id: &str,
    ) -> Result<i32, &'static str> {
        validate_name(name)?;

        let id = self.next_id();
        let addr = connection.addr();
        let client = Client::new(id, name.to_string(), version, device_id.to_string(), connection);

        info!(
            "Client {} ({}) connected from {} running {}",
            id, name, addr, version
        );
        self.clients.insert(id, client);

        Ok(id)
    }

    /// Removes a client from the registry
    ///
    /// Returns the removed client, or None if it was already gone.
    pub fn remove(&self, client_id: i32) -> Option<Client> {
        let removed = self.clients.remove(&client_id).map(|(_, client)| client);
        if removed.is_some() {
            trace!("Client {} removed", client_id);
        }
        removed
    }

    /// Returns a snapshot of the client with the given id
    pub fn get(&self, client_id: i32) -> Option<Client> {
        self.clients.get(&client_id).map(|entry| entry.clone())
    }

    /// Finds a client id by network address
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<i32> {
        self.clients
            .iter()
            .find(|entry| entry.addr() == addr)
            .map(|entry| entry.id)
    }

    /// Records the game the client was admitted to
    pub fn set_game(&self, client_id: i32, game: Option<GameCode>) {
        if let Some(mut client) = self.clients.get_mut(&client_id) {
            client.game = game;
        }
    }

    /// Gets all clients, ordered by id
    pub fn snapshot(&self) -> Vec<Client> {
        let mut clients: Vec<Client> = self.clients.iter().map(|entry| entry.clone()).collect();
        clients.sort_by_key(|client| client.id);
        clients
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
