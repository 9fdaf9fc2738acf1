//! Applying pool definitions through `virsh`.
//!
//! Rename is not a libvirt primitive. It is composed from the other
//! operations, with the original definition kept as a rollback point:
//!
//! ```text
//!   persistent? ──no──▶ Ok(false)
//!       │
//!   dumpxml + copy (backup)
//!       │
//!   delete old ──fail──▶ rollback ──▶ Err(Rename)
//!       │
//!   set name, set/del uuid
//!       │
//!   define new ──fail──▶ rollback ──▶ Err(Rename)
//!       │
//!   start new (if it was active)
//!       │
//!    Ok(true)
//! ```
//!
//! Rollback redefines the backup and restarts it if the pool was active.
//! A failing rollback is logged; the error returned is always the one that
//! triggered it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::base::LibvirtXml;
use crate::error::{Result, XmlError};
use crate::virsh::{StoragePool, Virsh};

use super::definition::PoolXml;

impl PoolXml {
    /// Define this pool, surfacing a command that could not run as `Err`.
    ///
    /// A define that ran but failed is logged and reported as `Ok(false)`.
    pub fn try_define(&self) -> Result<bool> {
        let xml = self.xml_string()?;
        let result = self.virsh().pool_define(&xml)?;
        if !result.success() {
            error!(
                pool = %self.name().unwrap_or_default(),
                stderr = %result.stderr,
                "Define pool failed"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Define this pool with libvirt.
    pub fn define(&self) -> bool {
        self.try_define().unwrap_or_else(|e| {
            error!(error = %e, "Define pool failed");
            false
        })
    }

    /// Remove this pool's definition from libvirt, keeping the XML here.
    pub fn undefine(&self) -> bool {
        let name = match self.name() {
            Ok(name) => name,
            Err(e) => {
                error!(error = %e, "Cannot undefine pool without a name");
                return false;
            }
        };
        match self.virsh().pool_undefine(&name) {
            Ok(()) => true,
            Err(e) => {
                error!(pool = %name, error = %e, "Undefine pool failed");
                false
            }
        }
    }

    /// Rename a persistent pool, optionally giving it a new uuid.
    ///
    /// Returns `Ok(false)` for a transient pool. Without `uuid` the old one
    /// is dropped and libvirt assigns a new one.
    #[instrument(skip(virsh, pools))]
    pub fn rename(
        name: &str,
        new_name: &str,
        uuid: Option<&str>,
        virsh: Arc<dyn Virsh>,
        pools: &dyn StoragePool,
    ) -> Result<bool> {
        if let Some(uuid) = uuid {
            Uuid::parse_str(uuid).map_err(|e| XmlError::malformed("uuid", e.to_string()))?;
        }

        if !pools.is_pool_persistent(name) {
            error!("Cannot rename transient pool");
            return Ok(false);
        }
        let was_active = pools.is_pool_active(name);

        let mut pool = Self::new_from_dumpxml(name, virsh)?;
        let backup = pool.copy()?;

        let rollback = |detail: String| -> XmlError {
            warn!(reason = %detail, "Rename failed, restoring original pool");
            match backup.try_define() {
                Ok(true) => {}
                Ok(false) => error!("Could not redefine original pool"),
                Err(e) => error!(error = %e, "Could not redefine original pool"),
            }
            if was_active && !pools.start_pool(name) {
                error!("Could not restart original pool");
            }
            XmlError::Rename(detail)
        };

        if !pools.delete_pool(name) {
            return Err(rollback(format!("Delete pool {name} failed")));
        }

        if let Err(e) = pool.retarget(new_name, uuid) {
            return Err(rollback(e.to_string()));
        }

        debug!("Defining renamed pool");
        match pool.try_define() {
            Ok(true) => {}
            Ok(false) => {
                pool.debug_xml();
                return Err(rollback(format!("Define pool {new_name} failed")));
            }
            Err(e) => {
                return Err(rollback(format!(
                    "Error reported while defining pool: {e}"
                )))
            }
        }

        if was_active && !pools.start_pool(new_name) {
            warn!("Renamed pool is defined but could not be started");
        }

        info!("Pool renamed");
        Ok(true)
    }

    fn retarget(&mut self, new_name: &str, uuid: Option<&str>) -> Result<()> {
        self.set_name(new_name)?;
        match uuid {
            Some(uuid) => self.set_uuid(uuid),
            None => self.del_uuid(),
        }
    }

    /// Dump a pool's definition into a new file in `dir`.
    ///
    /// The file name starts with the pool name and a timestamp. Returns
    /// `None` (and leaves no file behind) if the dump fails.
    #[instrument(skip(virsh))]
    pub fn backup_xml(name: &str, virsh: &dyn Virsh, dir: &Path) -> Option<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        let file = match tempfile::Builder::new()
            .prefix(&format!("{name}-{stamp}-"))
            .suffix(".xml")
            .tempfile_in(dir)
        {
            Ok(file) => file,
            Err(e) => {
                error!(error = %e, "Failed to create backup file");
                return None;
            }
        };

        if let Err(e) = virsh.pool_dumpxml_to_file(name, file.path()) {
            error!(error = %e, "Failed to backup pool XML");
            return None;
        }

        match file.keep() {
            Ok((_, path)) => {
                info!(path = %path.display(), "Pool XML backed up");
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "Failed to keep backup file");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Fault, MockCall, MockOp, MockVirsh};

    const P1: &str = "<pool type='dir'><name>p1</name><uuid>3e3fce45-4f53-4fa7-bb32-11f34168b82b</uuid><target><path>/var/lib/p1</path></target></pool>";

    fn setup() -> (Arc<MockVirsh>, Arc<dyn Virsh>) {
        let mock = Arc::new(MockVirsh::new());
        mock.insert_pool("p1", P1, true, true).unwrap();
        let virsh: Arc<dyn Virsh> = mock.clone();
        (mock, virsh)
    }

    #[test]
    fn test_define_and_undefine() {
        let (mock, virsh) = setup();
        let mut pool = PoolXml::new("dir", virsh);
        pool.set_name("p9").unwrap();
        assert!(pool.define());
        assert!(mock.is_pool_persistent("p9"));
        assert!(pool.undefine());
        assert!(mock.pool_xml("p9").is_none());
        assert!(!pool.undefine());
    }

    #[test]
    fn test_define_failure_is_false() {
        let (mock, virsh) = setup();
        let mut pool = PoolXml::new("dir", virsh);
        pool.set_name("p9").unwrap();

        mock.fail_next(MockOp::Define, Fault::Fail).unwrap();
        assert!(!pool.define());
        assert!(pool.try_define().unwrap());

        mock.fail_next(MockOp::Define, Fault::ExecError).unwrap();
        assert!(pool.try_define().is_err());
    }

    #[test]
    fn test_rename_rejects_bad_uuid_first() {
        let (mock, virsh) = setup();
        let err = PoolXml::rename("p1", "p2", Some("not-a-uuid"), virsh, mock.as_ref()).unwrap_err();
        assert!(matches!(err, XmlError::MalformedInput { .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_rename_with_uuid() {
        let (mock, virsh) = setup();
        let uuid = "8d3b4a4a-6f6e-4d36-9d3c-1e0c1f4b2a11";
        assert!(PoolXml::rename("p1", "p2", Some(uuid), virsh.clone(), mock.as_ref()).unwrap());
        let renamed = PoolXml::new_from_dumpxml("p2", virsh).unwrap();
        assert_eq!(renamed.uuid().unwrap(), uuid);
    }

    #[test]
    fn test_rename_restart_failure_still_succeeds() {
        let (mock, virsh) = setup();
        mock.fail_next(MockOp::Start, Fault::Fail).unwrap();
        assert!(PoolXml::rename("p1", "p2", None, virsh, mock.as_ref()).unwrap());
        assert!(mock.is_pool_persistent("p2"));
        assert!(!mock.is_pool_active("p2"));
        assert!(mock
            .mutations()
            .ends_with(&[MockCall::Start("p2".into())]));
    }

    #[test]
    fn test_backup_xml() {
        let (_mock, virsh) = setup();
        let dir = tempfile::tempdir().unwrap();

        let path = PoolXml::backup_xml("p1", virsh.as_ref(), dir.path()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("p1-"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), P1);

        assert!(PoolXml::backup_xml("missing", virsh.as_ref(), dir.path()).is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
