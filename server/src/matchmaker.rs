//! Turns a transport-level hello into a registered client

use crate::connection::ConnectionHandle;
use crate::messages;
use crate::state::ServerState;
use log::{info, warn};
use shared::protocol::messages as reasons;
use shared::{CodecError, DisconnectReason, GameVersion, MessageReader};

/// Identity a client presents when it connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub version: GameVersion,
    pub name: String,
    /// Absent for legacy clients
    pub device_id: Option<String>,
}

impl Handshake {
    pub fn parse(payload: &[u8]) -> Result<Self, CodecError> {
        let mut reader = MessageReader::new(0, payload);
        let version = GameVersion::from(reader.read_i32()?);
        let name = reader.read_string()?;
        let device_id = if reader.is_exhausted() {
            None
        } else {
            Some(reader.read_string()?)
        };

        Ok(Self {
            version,
            name,
            device_id,
        })
    }

    /// Supported builds must present an MD5 or SHA-256 shaped device id
    pub fn has_valid_device(&self) -> bool {
        if !self.version.is_supported() {
            return true;
        }
        self.device_id.as_deref().is_some_and(is_device_id)
    }
}

fn is_device_id(value: &str) -> bool {
    matches!(value.len(), 32 | 64) && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Sends the refusal both as a join error and as the disconnect reason
fn refuse(connection: &ConnectionHandle, text: &str) {
    connection.send_reliable(messages::join_error(DisconnectReason::Custom, Some(text)));
    connection.disconnect(DisconnectReason::Custom, Some(text.to_string()));
}

/// Handles the handshake payload of a new connection. Returns the client id
/// if the client was registered.
pub fn accept(state: &ServerState, connection: ConnectionHandle, payload: &[u8]) -> Option<i32> {
    let handshake = match Handshake::parse(payload) {
        Ok(handshake) => handshake,
        Err(e) => {
            warn!("Malformed handshake from {}: {}", connection.addr(), e);
            refuse(&connection, reasons::INVALID_CLIENT_DATA);
            return None;
        }
    };

    if !handshake.has_valid_device() {
        warn!(
            "Client {} from {} sent an invalid device id",
            handshake.name,
            connection.addr()
        );
        refuse(&connection, reasons::INVALID_CLIENT_DATA);
        return None;
    }

    let device_id = handshake.device_id.unwrap_or_default();
    if let Some(ban) = state.bans.find_ban(&device_id, connection.ip()) {
        info!(
            "Refused banned client {} from {}: {}",
            handshake.name,
            connection.addr(),
            ban.reason
        );
        refuse(
            &connection,
            &format!("You are banned from this server.\nReason: {}", ban.reason),
        );
        return None;
    }

    match state
        .clients
        .register(connection.clone(), &handshake.name, handshake.version, &device_id)
    {
        Ok(client_id) => Some(client_id),
        Err(text) => {
            info!("Refused name {:?} from {}", handshake.name, connection.addr());
            refuse(&connection, text);
            None
        }
    }
}
