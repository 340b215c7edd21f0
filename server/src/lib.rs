//! # Impostor Server Library
//!
//! Authoritative matchmaking and game-relay server for the Among Us UDP
//! protocol. Clients connect with a hello handshake, host or join games by
//! code, and exchange game data through the server, which validates every
//! network object message before relaying it to the rest of the lobby.
//!
//! ## Module Organization
//!
//! ### Transport (`network`, `connection`)
//! One socket, one task per connection. Reliable datagrams are acknowledged
//! and deduplicated; anything queued on a [`connection::ConnectionHandle`] is
//! framed and written back by the owning task.
//!
//! ### Matchmaking (`matchmaker`, `handler`, `client_manager`, `ban_manager`)
//! Handshake validation, the client registry, ban lists and dispatch of
//! root messages such as host, join, start and kick.
//!
//! ### Games (`game`, `game_manager`, `objects`, `rpc`)
//! Per-game state behind a `tokio::sync::RwLock`: the player roster with
//! each player's limbo state, the spawned network objects, and the rules
//! that decide whether an RPC is legitimate.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::ban_manager::BanManager;
//! use server::config::Config;
//! use server::network::Server;
//! use server::state::ServerState;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = Arc::new(ServerState::new(Config::default(), BanManager::new()));
//!     let server = Server::bind(state).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod ban_manager;
pub mod client_manager;
pub mod config;
pub mod connection;
pub mod console;
pub mod error;
pub mod events;
pub mod game;
pub mod game_manager;
pub mod handler;
pub mod matchmaker;
pub mod messages;
pub mod network;
pub mod objects;
pub mod rpc;
pub mod state;
