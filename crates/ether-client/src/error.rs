//! Client error types.

use ether_protocol::{ProtocolError, Reply};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration file missing, unreadable or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not reach the server, or it went away mid-session.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server sent bytes that do not decode.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server refused a frame.
    #[error("server replied {0}")]
    Rejected(Reply),

    #[error("timed out {0}")]
    Timeout(&'static str),
}

impl From<ether_core::TracingError> for ClientError {
    fn from(err: ether_core::TracingError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<ether_server::ServerError> for ClientError {
    fn from(err: ether_server::ServerError) -> Self {
        match err {
            ether_server::ServerError::Io(e) => Self::Io(e),
            ether_server::ServerError::Protocol(e) => Self::Protocol(e),
            other => Self::Config(other.to_string()),
        }
    }
}
