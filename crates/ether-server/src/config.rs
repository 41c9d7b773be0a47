//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ServerError, ServerResult};

/// Default TCP listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7331";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub listen_addr: SocketAddr,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Connection-level knobs handed to every accepted peer.
    pub connection: ConnectionConfig,
}

/// Per-connection limits.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Size of the receive buffer. One read is one frame, so this is also the
    /// largest frame a peer can send.
    pub read_buffer_size: usize,

    /// Abandon a peer that sends nothing for this long. `None` waits forever.
    pub idle_timeout: Option<Duration>,

    /// Upper bound on a single write, so a stalled peer cannot hold up room fan-out.
    pub write_timeout: Duration,

    /// Consecutive read errors tolerated before the connection is abandoned.
    pub max_read_errors: u32,

    /// Knocks a connection can have waiting for an answer; older ones are dropped.
    pub knock_backlog: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024,
            idle_timeout: None,
            write_timeout: Duration::from_secs(5),
            max_read_errors: 8,
            knock_backlog: 32,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: 256,
            connection: ConnectionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Creates a new server configuration listening on the given address.
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    /// Builder: set max connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Builder: set the receive buffer size.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.connection.read_buffer_size = size;
        self
    }

    /// Builder: set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connection.idle_timeout = timeout;
        self
    }

    /// Builder: set the write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.connection.write_timeout = timeout;
        self
    }

    /// Builder: set the consecutive read error budget.
    pub fn with_max_read_errors(mut self, max: u32) -> Self {
        self.connection.max_read_errors = max;
        self
    }

    /// Builder: set the pending knock backlog.
    pub fn with_knock_backlog(mut self, backlog: usize) -> Self {
        self.connection.knock_backlog = backlog;
        self
    }

    /// Rejects settings the connection loop cannot work with.
    pub fn validate(&self) -> ServerResult<()> {
        if self.max_connections == 0 {
            return Err(ServerError::config("max_connections must be at least 1"));
        }
        // a key frame needs its 4-byte header and a handshake needs 6 bytes
        if self.connection.read_buffer_size < 6 {
            return Err(ServerError::config("read_buffer_size must be at least 6 bytes"));
        }
        if self.connection.write_timeout.is_zero() {
            return Err(ServerError::config("write_timeout must be non-zero"));
        }
        if self.connection.max_read_errors == 0 {
            return Err(ServerError::config("max_read_errors must be at least 1"));
        }
        Ok(())
    }
}

/// Returns the default listen address.
pub fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7331))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr.to_string(), DEFAULT_LISTEN_ADDR);
        assert_eq!(config.max_connections, 256);
        assert_eq!(config.connection.read_buffer_size, 1024);
        assert_eq!(config.connection.idle_timeout, None);
        assert_eq!(config.connection.write_timeout, Duration::from_secs(5));
        assert_eq!(config.connection.max_read_errors, 8);
        assert_eq!(config.connection.knock_backlog, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn custom_config() {
        let addr: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let config = ServerConfig::new(addr)
            .with_max_connections(10)
            .with_read_buffer_size(4096)
            .with_idle_timeout(Some(Duration::from_secs(60)))
            .with_write_timeout(Duration::from_millis(250))
            .with_max_read_errors(2)
            .with_knock_backlog(4);

        assert_eq!(config.listen_addr, addr);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.connection.read_buffer_size, 4096);
        assert_eq!(config.connection.idle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.connection.write_timeout, Duration::from_millis(250));
        assert_eq!(config.connection.max_read_errors, 2);
        assert_eq!(config.connection.knock_backlog, 4);
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let base = ServerConfig::default();
        assert!(base.clone().with_max_connections(0).validate().is_err());
        assert!(base.clone().with_read_buffer_size(5).validate().is_err());
        assert!(base.clone().with_write_timeout(Duration::ZERO).validate().is_err());
        assert!(matches!(
            base.with_max_read_errors(0).validate(),
            Err(ServerError::Config { .. })
        ));
    }
}
