//! CLI, TCP client and TOML config for the ether room network.
//!
//! This crate provides the `ether` command-line interface and
//! [`EtherClient`], a session client usable from other programs.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use client::{DEFAULT_TIMEOUT, EtherClient};
pub use config::EtherConfig;
pub use error::{ClientError, ClientResult};
