//! # virtpool
//!
//! Command-line front end for libvirt storage pool definitions.
//!
//! ## Usage
//! ```bash
//! virtpool details default
//! virtpool --uri qemu:///system rename images images-old
//! virtpool --config /etc/virtpool/virtpool.yaml backup default --dir /srv/backup
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};

mod cli;
mod commands;
mod config;

use cli::Args;
use config::{Config, LogFormat};

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration before logging so the file can choose the level
    let config = Config::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?
        .with_cli_overrides(&args);
    config.validate()?;

    match config.logging.format {
        LogFormat::Pretty => virtpool_common::init_logging(&config.logging.level)?,
        LogFormat::Json => virtpool_common::init_logging_json(&config.logging.level)?,
    }

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        binary = %config.virsh.binary,
        uri = ?config.virsh.uri,
        "virtpool configured"
    );

    if let Err(e) = commands::run(args.command, &config) {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    Ok(())
}
