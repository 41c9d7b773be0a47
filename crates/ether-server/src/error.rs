//! Server error types.

use std::io;

use ether_protocol::RoomId;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (listener, socket).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, encoding).
    #[error("Protocol error: {0}")]
    Protocol(#[from] ether_protocol::ProtocolError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Shutdown requested.
    #[error("Server shutdown requested")]
    Shutdown,
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Membership operation refused by a room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("connection is already a member of room {0}")]
    AlreadyMember(RoomId),

    #[error("connection is not a member of room {0}")]
    NotMember(RoomId),

    #[error("room {0} is closed")]
    Closed(RoomId),
}

/// Registry lookup or creation refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("room {0} not found")]
    NotFound(RoomId),

    #[error("room {0} already exists")]
    AlreadyExists(RoomId),
}

/// A connection state change outside the allowed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid state transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: crate::connection::AuthState,
    pub to: crate::connection::AuthState,
}
