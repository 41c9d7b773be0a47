//! `ether serve`: runs the room daemon in the foreground until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use ether_server::{RoomRegistry, ServerConfig, SignalHandler, SocketServer};
use tracing::info;

use crate::cli::ServeArgs;
use crate::config::EtherConfig;
use crate::error::ClientResult;

/// File settings with command-line overrides applied.
pub fn server_config(args: &ServeArgs, config: &EtherConfig) -> ServerConfig {
    let mut server = config.to_server_config();
    if let Some(listen) = args.listen {
        server.listen_addr = listen;
    }
    if let Some(max) = args.max_connections {
        server = server.with_max_connections(max);
    }
    if let Some(secs) = args.idle_timeout {
        server = server.with_idle_timeout(Some(Duration::from_secs(secs)));
    }
    server
}

pub async fn run(args: &ServeArgs, config: &EtherConfig) -> ClientResult<()> {
    let server = SocketServer::bind(server_config(args, config)).await?;

    let signals = SignalHandler::new();
    signals.spawn_listener()?;

    let registry = Arc::new(RoomRegistry::new());
    server
        .run_until_shutdown(Arc::clone(&registry), signals.shutdown().wait())
        .await?;

    info!(by_signal = signals.is_shutdown(), "server stopped");
    Ok(())
}
