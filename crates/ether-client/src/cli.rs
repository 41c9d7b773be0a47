//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ether_core::TracingOutputFormat;

/// ether - rooms, knocks and relayed messages over TCP
#[derive(Debug, Parser)]
#[command(name = "ether")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the room daemon in the foreground
    Serve(ServeArgs),

    /// Handshake, exchange a key and disconnect
    Ping(ConnectArgs),

    /// Join a room, relay one message and disconnect
    Send {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Room to join
        #[arg(long, short)]
        room: String,

        /// Message payload, sent as UTF-8 bytes
        message: String,
    },

    /// Join a room and print notifications until it closes
    Listen {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Room to join
        #[arg(long, short)]
        room: String,

        /// Print one JSON object per notification
        #[arg(long)]
        json: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `ether serve`; each overrides the `[server]` table.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Maximum concurrent connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Drop peers silent for this many seconds
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Log output format (pretty, compact, json)
    #[arg(long)]
    pub log_format: Option<TracingOutputFormat>,
}

/// Where to connect and which key to present; each overrides the `[client]` table.
#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Server address
    #[arg(long, short)]
    pub addr: Option<SocketAddr>,

    /// Key sent during key exchange
    #[arg(long, short, env = "ETHER_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Connect and reply timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective configuration as TOML
    Dump,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::try_parse_from([
            "ether",
            "serve",
            "--listen",
            "0.0.0.0:7000",
            "--idle-timeout",
            "30",
            "--log-format",
            "json",
        ])
        .unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.listen, Some("0.0.0.0:7000".parse().unwrap()));
        assert_eq!(args.idle_timeout, Some(30));
        assert_eq!(args.log_format, Some(TracingOutputFormat::Json));
        assert_eq!(args.max_connections, None);
    }

    #[test]
    fn send_takes_room_and_message() {
        let cli = Cli::try_parse_from(["ether", "-v", "send", "--room", "lobby", "hello"]).unwrap();
        assert!(cli.debug);
        let Command::Send { room, message, connect } = cli.command else {
            panic!("expected send");
        };
        assert_eq!(room, "lobby");
        assert_eq!(message, "hello");
        assert_eq!(connect.addr, None);
    }

    #[test]
    fn bad_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["ether", "serve", "--log-format", "xml"]).is_err());
    }
}
