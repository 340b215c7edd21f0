//! Server configuration
//!
//! Values come from an optional JSON file and are then overridden by command
//! line flags in `main`. Every field has a default, so an empty object (or no
//! file at all) yields a working server.

use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub anti_cheat: AntiCheatConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_ip: String,
    pub listen_port: u16,
    pub public_ip: String,
    pub max_listings: usize,
    pub spawn_timeout_ms: u64,
    pub connection_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_ip: "0.0.0.0".to_string(),
            listen_port: shared::DEFAULT_PORT,
            public_ip: "127.0.0.1".to_string(),
            max_listings: 10,
            spawn_timeout_ms: 2500,
            connection_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiCheatConfig {
    /// When off, rule violations are logged and the message dropped
    pub enabled: bool,
    pub ban_ip_from_game: bool,
    pub ban_globally: bool,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ban_ip_from_game: true,
            ban_globally: false,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ServerError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.server.max_listings == 0 {
            return Err(ServerError::Config("max_listings must be at least 1".into()));
        }
        if self.server.connection_timeout_ms == 0 {
            return Err(ServerError::Config("connection_timeout_ms must be positive".into()));
        }
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ServerError> {
        let address = format!("{}:{}", self.server.listen_ip, self.server.listen_port);
        address
            .parse()
            .map_err(|_| ServerError::InvalidAddress(address))
    }

    pub fn spawn_timeout(&self) -> Duration {
        Duration::from_millis(self.server.spawn_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.server.connection_timeout_ms)
    }
}
