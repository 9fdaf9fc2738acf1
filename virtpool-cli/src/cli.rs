//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// virtpool - inspect and manage libvirt storage pool definitions
#[derive(Parser, Debug)]
#[command(name = "virtpool")]
#[command(about = "Inspect and manage libvirt storage pool definitions")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (defaults used if the default file is missing)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Libvirt connection URI passed to virsh -c
    #[arg(long, env = "VIRTPOOL_URI")]
    pub uri: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the XML definition of a pool
    Dumpxml { name: String },

    /// Print the type of a pool
    Type { name: String },

    /// Print type, uuid, sizes and target path of a pool as JSON
    Details { name: String },

    /// Define a pool from an XML file
    Define { file: PathBuf },

    /// Remove the definition of a pool
    Undefine { name: String },

    /// Rename a persistent pool
    Rename {
        name: String,
        new_name: String,
        /// Uuid for the renamed pool (libvirt assigns one if omitted)
        #[arg(long)]
        uuid: Option<String>,
    },

    /// Save a pool's XML definition to a file
    Backup {
        name: String,
        /// Directory for the backup (defaults to the configured tmp_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Print the supported formats per pool type as JSON
    Capabilities,
}
