//! `ether send`: join a room, relay one message, leave.

use tracing::info;

use crate::cli::ConnectArgs;
use crate::config::EtherConfig;
use crate::error::ClientResult;

pub async fn run(
    args: &ConnectArgs,
    room: &str,
    message: &str,
    config: &EtherConfig,
) -> ClientResult<()> {
    let room = super::parse_room(room)?;
    let mut client = super::open_session(args, config).await?;
    client.join(&room).await?;
    client.send_message(message.as_bytes()).await?;
    client.disconnect().await?;
    info!(%room, len = message.len(), "message sent");
    Ok(())
}
