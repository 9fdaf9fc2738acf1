//! Collaborator traits for the external pool management tool.

use std::path::Path;

use crate::error::{Result, XmlError};

/// Outcome of a command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdResult {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Pool commands of `virsh`.
///
/// Implemented by [`VirshCommand`](super::VirshCommand) for real hosts and by
/// [`MockVirsh`](crate::mock::MockVirsh) for tests.
pub trait Virsh: Send + Sync {
    /// Current XML definition of a pool.
    fn pool_dumpxml(&self, name: &str) -> Result<String>;

    /// Dump a pool's XML definition into `path`.
    fn pool_dumpxml_to_file(&self, name: &str, path: &Path) -> Result<()> {
        let xml = self.pool_dumpxml(name)?;
        std::fs::write(path, xml).map_err(|e| XmlError::io(path, e))
    }

    /// Define (or redefine) a persistent pool from XML.
    ///
    /// A non-zero exit is reported through [`CmdResult`]; `Err` means the
    /// command could not be executed at all.
    fn pool_define(&self, xml: &str) -> Result<CmdResult>;

    /// Remove a pool's persistent definition. Fails on non-zero exit.
    fn pool_undefine(&self, name: &str) -> Result<()>;

    /// The host's `pool-capabilities` document.
    fn pool_capabilities(&self) -> Result<String>;
}

/// Pool state queries and transitions.
///
/// These never fail; problems are logged by the implementation and reported
/// as `false`.
pub trait StoragePool: Send + Sync {
    fn is_pool_persistent(&self, name: &str) -> bool;

    fn is_pool_active(&self, name: &str) -> bool;

    fn start_pool(&self, name: &str) -> bool;

    /// Stop the pool if it is running and remove its definition.
    fn delete_pool(&self, name: &str) -> bool;
}
