//! Daemon side of the ether room network.
//!
//! Peers connect over TCP, authenticate with a handshake and a key, then join
//! rooms and exchange knocks and opaque messages with the other members.
//!
//! - [`Connection`]: per-peer state machine, one tokio task each
//! - [`Room`]: membership and fan-out
//! - [`RoomRegistry`]: the in-memory [`Manager`] mapping room ids to rooms
//! - [`SocketServer`]: TCP accept loop with a connection limit
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ether_server::{RoomRegistry, ServerConfig, SignalHandler, SocketServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = SocketServer::bind(ServerConfig::default()).await?;
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener()?;
//!
//!     let registry = Arc::new(RoomRegistry::new());
//!     server.run_until_shutdown(registry, signals.shutdown().wait()).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod error;
mod key;
mod manager;
mod member;
mod room;
mod signals;
mod sink;
mod socket;

pub use config::{ConnectionConfig, DEFAULT_LISTEN_ADDR, ServerConfig, default_listen_addr};
pub use connection::{AbandonReason, AuthState, Connection, Exit};
pub use error::{InvalidTransition, ManagerError, RoomError, ServerError, ServerResult};
pub use key::{KEY_ID_LEN, SessionKey};
pub use manager::{Manager, RoomRegistry};
pub use member::{Member, PendingKnock};
pub use room::{Departure, Room, RoomState, TerminationReason};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use sink::{BoxFuture, FrameSink, StreamSink};
pub use socket::SocketServer;
