//! Configuration commands.

use std::path::Path;

use crate::config::EtherConfig;
use crate::error::ClientResult;

/// Dump the effective configuration to stdout.
pub fn dump(config: &EtherConfig, explicit: Option<&Path>) -> ClientResult<()> {
    println!("# config.toml ({})", EtherConfig::resolved_path(explicit).display());
    println!("{}", config.to_toml()?);
    Ok(())
}

/// Show the configuration file path.
pub fn path(explicit: Option<&Path>) -> ClientResult<()> {
    let config_path = EtherConfig::resolved_path(explicit);
    let note = if config_path.exists() { "" } else { " (not found, using defaults)" };
    println!("config: {}{note}", config_path.display());
    Ok(())
}
