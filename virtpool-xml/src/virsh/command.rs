//! [`Virsh`] and [`StoragePool`] backed by the `virsh` binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, error, info, instrument, warn};

use super::traits::{CmdResult, StoragePool, Virsh};
use crate::error::{Result, XmlError};

/// Runs `virsh` commands against one libvirt connection.
#[derive(Debug, Clone)]
pub struct VirshCommand {
    binary: PathBuf,
    uri: Option<String>,
    tmp_dir: PathBuf,
}

impl VirshCommand {
    /// `virsh` from `PATH`, default connection, system temp dir.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("virsh"),
            uri: None,
            tmp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Connect to `uri` (`virsh -c <uri>`) instead of the default.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Directory for the temporary files handed to `pool-define`.
    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = dir.into();
        self
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    fn display(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary.display(), args.join(" "))
    }

    /// Run a subcommand to completion. Only a failure to spawn is an error.
    fn exec(&self, args: &[&str]) -> Result<CmdResult> {
        debug!(binary = %self.binary.display(), uri = ?self.uri, args = ?args, "Executing command");

        let mut cmd = Command::new(&self.binary);
        if let Some(uri) = &self.uri {
            cmd.args(["-c", uri.as_str()]);
        }
        let output = cmd.args(args).output().map_err(|e| XmlError::ExternalCommand {
            command: self.display(args),
            status: None,
            stderr: format!("failed to execute: {e}"),
        })?;

        Ok(CmdResult {
            exit_status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run a subcommand and return its stdout, failing on non-zero exit.
    fn run(&self, args: &[&str]) -> Result<String> {
        let result = self.exec(args)?;
        if !result.success() {
            error!(command = %self.display(args), stderr = %result.stderr, "Command failed");
            return Err(XmlError::ExternalCommand {
                command: self.display(args),
                status: Some(result.exit_status),
                stderr: result.stderr,
            });
        }
        Ok(result.stdout)
    }

    /// Parsed `virsh pool-info` for one pool.
    pub fn pool_info(&self, name: &str) -> Result<PoolInfo> {
        Ok(parse_pool_info(&self.run(&["pool-info", name])?))
    }
}

impl Default for VirshCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Virsh for VirshCommand {
    fn pool_dumpxml(&self, name: &str) -> Result<String> {
        self.run(&["pool-dumpxml", name])
    }

    #[instrument(skip(self, xml))]
    fn pool_define(&self, xml: &str) -> Result<CmdResult> {
        let mut file = tempfile::Builder::new()
            .prefix("pool-define-")
            .suffix(".xml")
            .tempfile_in(&self.tmp_dir)
            .map_err(|e| XmlError::io(&self.tmp_dir, e))?;
        file.write_all(xml.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| XmlError::io(file.path(), e))?;

        let path = file.path().to_string_lossy().into_owned();
        let result = self.exec(&["pool-define", &path])?;
        if result.success() {
            info!("Pool defined");
        }
        Ok(result)
    }

    fn pool_undefine(&self, name: &str) -> Result<()> {
        self.run(&["pool-undefine", name]).map(|_| ())
    }

    fn pool_capabilities(&self) -> Result<String> {
        self.run(&["pool-capabilities"])
    }
}

impl StoragePool for VirshCommand {
    fn is_pool_persistent(&self, name: &str) -> bool {
        match self.pool_info(name) {
            Ok(info) => info.persistent,
            Err(e) => {
                debug!(pool = %name, error = %e, "Cannot read pool info");
                false
            }
        }
    }

    fn is_pool_active(&self, name: &str) -> bool {
        match self.pool_info(name) {
            Ok(info) => info.is_active(),
            Err(e) => {
                debug!(pool = %name, error = %e, "Cannot read pool info");
                false
            }
        }
    }

    #[instrument(skip(self))]
    fn start_pool(&self, name: &str) -> bool {
        match self.run(&["pool-start", name]) {
            Ok(_) => {
                info!("Pool started");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to start pool");
                false
            }
        }
    }

    #[instrument(skip(self))]
    fn delete_pool(&self, name: &str) -> bool {
        let info = match self.pool_info(name) {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Cannot delete unknown pool");
                return false;
            }
        };

        if info.is_active() {
            if let Err(e) = self.run(&["pool-destroy", name]) {
                warn!(error = %e, "Failed to destroy pool");
                return false;
            }
        }
        if info.persistent {
            if let Err(e) = self.run(&["pool-undefine", name]) {
                warn!(error = %e, "Failed to undefine pool");
                return false;
            }
        }

        info!("Pool deleted");
        true
    }
}

/// Fields of interest from `virsh pool-info`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolInfo {
    pub name: String,
    pub uuid: String,
    pub state: String,
    pub persistent: bool,
    pub autostart: bool,
}

impl PoolInfo {
    pub fn is_active(&self) -> bool {
        self.state == "running"
    }
}

/// Parse the `Key:   value` lines printed by `virsh pool-info`.
pub fn parse_pool_info(output: &str) -> PoolInfo {
    let mut info = PoolInfo::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Name" => info.name = value.to_string(),
            "UUID" => info.uuid = value.to_string(),
            "State" => info.state = value.to_string(),
            "Persistent" => info.persistent = value == "yes",
            "Autostart" => info.autostart = value == "yes",
            _ => {}
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL_INFO: &str = "\
Name:           default
UUID:           3e3fce45-4f53-4fa7-bb32-11f34168b82b
State:          running
Persistent:     yes
Autostart:      no
Capacity:       48.91 GiB
Allocation:     12.04 GiB
Available:      36.87 GiB
";

    #[test]
    fn test_parse_pool_info() {
        let info = parse_pool_info(POOL_INFO);
        assert_eq!(info.name, "default");
        assert_eq!(info.uuid, "3e3fce45-4f53-4fa7-bb32-11f34168b82b");
        assert!(info.is_active());
        assert!(info.persistent);
        assert!(!info.autostart);
    }

    #[test]
    fn test_parse_pool_info_inactive_transient() {
        let info = parse_pool_info("Name: p1\nState: inactive\nPersistent: no\n");
        assert!(!info.is_active());
        assert!(!info.persistent);
    }

    #[test]
    fn test_missing_binary_is_exec_error() {
        let virsh = VirshCommand::new().with_binary("/nonexistent/virsh");
        let err = virsh.pool_define("<pool type='dir'/>").unwrap_err();
        assert!(matches!(err, XmlError::ExternalCommand { status: None, .. }));
        assert!(!virsh.is_pool_persistent("p1"));
        assert!(!virsh.start_pool("p1"));
    }

    #[test]
    fn test_uri_and_tmp_dir() {
        let virsh = VirshCommand::new()
            .with_uri("qemu:///system")
            .with_tmp_dir("/var/tmp");
        assert_eq!(virsh.tmp_dir(), Path::new("/var/tmp"));
        assert_eq!(virsh.display(&["pool-list", "--all"]), "virsh pool-list --all");
    }
}
