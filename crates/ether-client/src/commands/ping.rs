//! `ether ping`: checks that a server is up and accepts the key.

use std::time::Instant;

use tracing::debug;

use crate::cli::ConnectArgs;
use crate::config::EtherConfig;
use crate::error::ClientResult;

pub async fn run(args: &ConnectArgs, config: &EtherConfig) -> ClientResult<()> {
    let started = Instant::now();
    let client = super::open_session(args, config).await?;
    let established = started.elapsed();
    client.disconnect().await?;
    debug!(?established, total = ?started.elapsed(), "ping done");

    println!(
        "pong from {}: session established in {:.1} ms",
        args.addr.unwrap_or(config.client.addr),
        established.as_secs_f64() * 1000.0
    );
    Ok(())
}
