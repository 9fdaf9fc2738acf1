//! Subcommand execution.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;
use virtpool_xml::{LibvirtXml, PoolCapabilityXml, PoolXml, Virsh, VirshCommand};

use crate::cli::Command;
use crate::config::Config;

/// Run one subcommand, printing its result to stdout.
pub fn run(command: Command, config: &Config) -> Result<()> {
    let runner = Arc::new(config.virsh_command());
    let virsh: Arc<dyn Virsh> = runner.clone();

    match command {
        Command::Dumpxml { name } => {
            let pool = PoolXml::new_from_dumpxml(&name, virsh)?;
            println!("{}", pool.xml_string()?);
        }
        Command::Type { name } => {
            println!("{}", PoolXml::get_type(&name, virsh)?);
        }
        Command::Details { name } => {
            let details = PoolXml::get_pool_details(&name, virsh)?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
        Command::Define { file } => {
            let xml = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let pool = PoolXml::from_text(xml, virsh);
            let name = pool.name().context("Pool XML has no name")?;
            if !pool.define() {
                bail!("Failed to define pool {}", name);
            }
            info!(pool = %name, "Pool defined");
        }
        Command::Undefine { name } => {
            let pool = PoolXml::new_from_dumpxml(&name, virsh)?;
            if !pool.undefine() {
                bail!("Failed to undefine pool {}", name);
            }
        }
        Command::Rename {
            name,
            new_name,
            uuid,
        } => rename(&runner, virsh, &name, &new_name, uuid.as_deref())?,
        Command::Backup { name, dir } => {
            let dir = dir.unwrap_or_else(|| config.virsh.tmp_dir.clone());
            let path = PoolXml::backup_xml(&name, virsh.as_ref(), &dir)
                .ok_or_else(|| anyhow!("Failed to back up pool {}", name))?;
            println!("{}", path.display());
        }
        Command::Capabilities => {
            let capabilities = PoolCapabilityXml::new(virsh.as_ref())?.get_pool_capabilities()?;
            println!("{}", serde_json::to_string_pretty(&capabilities)?);
        }
    }
    Ok(())
}

fn rename(
    runner: &VirshCommand,
    virsh: Arc<dyn Virsh>,
    name: &str,
    new_name: &str,
    uuid: Option<&str>,
) -> Result<()> {
    if !PoolXml::rename(name, new_name, uuid, virsh, runner)? {
        bail!("Pool {} is transient and cannot be renamed", name);
    }
    info!(from = %name, to = %new_name, "Pool renamed");
    Ok(())
}
