//! ether CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use ether_client::cli::{Cli, Command, ConfigAction};
use ether_client::commands;
use ether_client::config::EtherConfig;
use ether_client::error::ClientResult;
use ether_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = EtherConfig::load(cli.config.as_deref())?;
    init_tracing(tracing_config(&cli, &config))?;

    match &cli.command {
        Command::Serve(args) => commands::serve::run(args, &config).await,
        Command::Ping(connect) => commands::ping::run(connect, &config).await,
        Command::Send {
            connect,
            room,
            message,
        } => commands::send::run(connect, room, message, &config).await,
        Command::Listen {
            connect,
            room,
            json,
        } => commands::listen::run(connect, room, *json, &config).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, cli.config.as_deref()),
            ConfigAction::Path => commands::config::path(cli.config.as_deref()),
        },
    }
}

/// The daemon logs at info in its configured format; client commands stay
/// quiet unless `--debug` is given.
fn tracing_config(cli: &Cli, config: &EtherConfig) -> TracingConfig {
    match &cli.command {
        Command::Serve(args) => {
            let format = args.log_format.unwrap_or(config.server.log_format);
            let level = if cli.debug { Level::DEBUG } else { Level::INFO };
            TracingConfig::daemon().with_format(format).with_level(level)
        }
        _ if cli.debug => TracingConfig::cli_debug(),
        _ => TracingConfig::cli_debug().with_level(Level::WARN),
    }
}
