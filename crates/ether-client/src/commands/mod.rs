//! Subcommand implementations.

pub mod config;
pub mod listen;
pub mod ping;
pub mod send;
pub mod serve;

use ether_protocol::RoomId;

use crate::cli::ConnectArgs;
use crate::client::EtherClient;
use crate::config::EtherConfig;
use crate::error::{ClientError, ClientResult};

/// Connects, handshakes and exchanges the key, with CLI flags taking
/// precedence over the `[client]` table.
pub(crate) async fn open_session(args: &ConnectArgs, config: &EtherConfig) -> ClientResult<EtherClient> {
    let settings = &config.client;
    let addr = args.addr.unwrap_or(settings.addr);
    let timeout = args
        .timeout
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| settings.timeout());
    let key = args.key.as_deref().unwrap_or(&settings.key);

    let mut client = EtherClient::connect(addr, timeout).await?;
    client.exchange_key(key.as_bytes()).await?;
    Ok(client)
}

pub(crate) fn parse_room(room: &str) -> ClientResult<RoomId> {
    RoomId::try_from(room).map_err(|e| ClientError::Config(format!("invalid room '{room}': {e}")))
}
