//! Configuration file.
//!
//! Everything lives in one `config.toml`, looked up in this order:
//! `--config`, `$ETHER_CONFIG`, then `~/.config/ether/config.toml`. A missing
//! default file is not an error; a missing explicit one is.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:7331"
//! max_connections = 512
//! idle_timeout_secs = 300
//! log_format = "json"
//!
//! [client]
//! addr = "10.0.0.2:7331"
//! key = "team-key"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ether_core::TracingOutputFormat;
use ether_server::{ConnectionConfig, ServerConfig, default_listen_addr};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "ETHER_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtherConfig {
    /// Daemon settings, used by `ether serve`.
    pub server: ServerSettings,

    /// Defaults for the client subcommands.
    pub client: ClientSettings,
}

/// `[server]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen: SocketAddr,
    pub max_connections: usize,
    pub read_buffer_size: usize,
    /// Seconds of silence before a peer is dropped. Absent means never.
    pub idle_timeout_secs: Option<u64>,
    pub write_timeout_ms: u64,
    pub max_read_errors: u32,
    pub knock_backlog: usize,
    pub log_format: TracingOutputFormat,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let connection = ConnectionConfig::default();
        Self {
            listen: default_listen_addr(),
            max_connections: ServerConfig::default().max_connections,
            read_buffer_size: connection.read_buffer_size,
            idle_timeout_secs: connection.idle_timeout.map(|d| d.as_secs()),
            write_timeout_ms: connection.write_timeout.as_millis() as u64,
            max_read_errors: connection.max_read_errors,
            knock_backlog: connection.knock_backlog,
            log_format: TracingOutputFormat::Compact,
        }
    }
}

/// `[client]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Server to talk to.
    pub addr: SocketAddr,

    /// Key handed over during key exchange.
    pub key: String,

    /// Connect and reply timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            addr: default_listen_addr(),
            key: "ether".to_string(),
            timeout_secs: 5,
        }
    }
}

impl ClientSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EtherConfig {
    /// Loads the file named by `explicit`, then `$ETHER_CONFIG`, then the
    /// default path. Only the default path may be absent.
    pub fn load(explicit: Option<&Path>) -> ClientResult<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))
    }

    /// Parses TOML text.
    pub fn parse(content: &str) -> ClientResult<Self> {
        toml::from_str(content).map_err(|e| ClientError::Config(format!("failed to parse config: {e}")))
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> ClientResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ClientError::Config(format!("failed to render config: {e}")))
    }

    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ether")
    }

    /// Path `load` would read for the given `--config` value.
    pub fn resolved_path(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(Self::default_path)
    }

    /// Builds the daemon configuration from the `[server]` table.
    pub fn to_server_config(&self) -> ServerConfig {
        let s = &self.server;
        ServerConfig::new(s.listen)
            .with_max_connections(s.max_connections)
            .with_read_buffer_size(s.read_buffer_size)
            .with_idle_timeout(s.idle_timeout_secs.map(Duration::from_secs))
            .with_write_timeout(Duration::from_millis(s.write_timeout_ms))
            .with_max_read_errors(s.max_read_errors)
            .with_knock_backlog(s.knock_backlog)
    }
}
