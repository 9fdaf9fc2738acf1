//! Integration tests for pool lifecycle operations.
//!
//! These tests drive the public API against the in-memory `MockVirsh`.

use std::sync::Arc;

use virtpool_xml::mock::{Fault, MockCall, MockOp};
use virtpool_xml::{LibvirtXml, MockVirsh, PoolXml, StoragePool, Virsh, XmlError};

const P1: &str = r#"<pool type='dir'>
  <name>p1</name>
  <uuid>3e3fce45-4f53-4fa7-bb32-11f34168b82b</uuid>
  <capacity unit='bytes'>52521566208</capacity>
  <allocation unit='bytes'>12931731456</allocation>
  <available unit='bytes'>39589834752</available>
  <source>
  </source>
  <target>
    <path>/var/lib/libvirt/images</path>
    <permissions>
      <mode>0711</mode>
      <owner>0</owner>
      <group>0</group>
    </permissions>
  </target>
</pool>"#;

fn mock_with_p1(active: bool, persistent: bool) -> (Arc<MockVirsh>, Arc<dyn Virsh>) {
    let mock = Arc::new(MockVirsh::new());
    mock.insert_pool("p1", P1, active, persistent)
        .expect("Failed to insert pool");
    let virsh: Arc<dyn Virsh> = mock.clone();
    (mock, virsh)
}

fn mutation(call: fn(String) -> MockCall, name: &str) -> MockCall {
    call(name.to_string())
}

/// A dumped pool exposes its type and target path.
#[test]
fn test_new_from_dumpxml() {
    let (_mock, virsh) = mock_with_p1(true, true);
    let pool = PoolXml::new_from_dumpxml("p1", virsh.clone()).unwrap();
    assert_eq!(pool.pool_type().unwrap(), "dir");
    assert_eq!(pool.target_path().unwrap(), "/var/lib/libvirt/images");
    assert_eq!(PoolXml::get_type("p1", virsh).unwrap(), "dir");
}

/// Dumping an unknown pool propagates the command error.
#[test]
fn test_new_from_dumpxml_unknown_pool() {
    let (_mock, virsh) = mock_with_p1(true, true);
    let err = PoolXml::new_from_dumpxml("nope", virsh).unwrap_err();
    assert!(matches!(err, XmlError::ExternalCommand { .. }));
}

/// Details carry the numeric fields; gluster pools omit the target path.
#[test]
fn test_get_pool_details() {
    let (mock, virsh) = mock_with_p1(true, true);
    let details = PoolXml::get_pool_details("p1", virsh.clone()).unwrap();
    assert_eq!(details.pool_type, "dir");
    assert_eq!(details.uuid, "3e3fce45-4f53-4fa7-bb32-11f34168b82b");
    assert_eq!(details.capacity, 52_521_566_208);
    assert_eq!(
        details.target_path.as_deref(),
        Some("/var/lib/libvirt/images")
    );

    let json = serde_json::to_value(&details).unwrap();
    assert_eq!(json["type"], "dir");
    assert_eq!(json["allocation"], 12_931_731_456u64);

    let gluster = P1.replace("type='dir'", "type='gluster'");
    mock.insert_pool("g1", &gluster, true, true).unwrap();
    let details = PoolXml::get_pool_details("g1", virsh).unwrap();
    assert_eq!(details.target_path, None);
    let json = serde_json::to_value(&details).unwrap();
    assert!(json.get("target_path").is_none());
}

/// Renaming an active persistent pool deletes, defines and starts, in order.
#[test]
fn test_rename_active_pool() {
    let (mock, virsh) = mock_with_p1(true, true);

    assert!(PoolXml::rename("p1", "p2", None, virsh.clone(), mock.as_ref()).unwrap());
    assert_eq!(
        mock.mutations(),
        vec![
            mutation(MockCall::Delete, "p1"),
            mutation(MockCall::Define, "p2"),
            mutation(MockCall::Start, "p2"),
        ]
    );

    assert_eq!(mock.pool_names(), vec!["p2".to_string()]);
    assert!(mock.is_pool_active("p2"));

    // A new uuid was assigned because none was requested.
    let renamed = PoolXml::new_from_dumpxml("p2", virsh).unwrap();
    assert_ne!(renamed.uuid().unwrap(), "3e3fce45-4f53-4fa7-bb32-11f34168b82b");
    assert_eq!(renamed.target_path().unwrap(), "/var/lib/libvirt/images");
}

/// An inactive pool is renamed without being started.
#[test]
fn test_rename_inactive_pool() {
    let (mock, virsh) = mock_with_p1(false, true);
    assert!(PoolXml::rename("p1", "p2", None, virsh, mock.as_ref()).unwrap());
    assert!(!mock.mutations().contains(&mutation(MockCall::Start, "p2")));
    assert!(!mock.is_pool_active("p2"));
}

/// A transient pool is rejected before anything else happens.
#[test]
fn test_rename_transient_pool() {
    let (mock, virsh) = mock_with_p1(true, false);
    assert!(!PoolXml::rename("p1", "p2", None, virsh, mock.as_ref()).unwrap());
    assert_eq!(mock.calls(), vec![MockCall::IsPersistent("p1".into())]);
}

/// A failed delete restores the original and defines nothing new.
#[test]
fn test_rename_delete_failure_rolls_back() {
    let (mock, virsh) = mock_with_p1(true, true);
    mock.fail_next(MockOp::Delete, Fault::Fail).unwrap();

    let err = PoolXml::rename("p1", "p2", None, virsh, mock.as_ref()).unwrap_err();
    assert!(matches!(err, XmlError::Rename(ref msg) if msg.contains("Delete pool p1")));

    assert_eq!(
        mock.mutations(),
        vec![
            mutation(MockCall::Delete, "p1"),
            mutation(MockCall::Define, "p1"),
            mutation(MockCall::Start, "p1"),
        ]
    );
    assert_eq!(mock.pool_names(), vec!["p1".to_string()]);
}

/// A define that runs but fails restores the original pool.
#[test]
fn test_rename_define_failure_rolls_back() {
    let (mock, virsh) = mock_with_p1(true, true);
    mock.fail_next(MockOp::Define, Fault::Fail).unwrap();

    let err = PoolXml::rename("p1", "p2", None, virsh.clone(), mock.as_ref()).unwrap_err();
    assert!(matches!(err, XmlError::Rename(ref msg) if msg.contains("Define pool p2")));

    assert_eq!(mock.pool_names(), vec!["p1".to_string()]);
    assert!(mock.is_pool_active("p1"));
    let restored = PoolXml::new_from_dumpxml("p1", virsh).unwrap();
    assert_eq!(restored.uuid().unwrap(), "3e3fce45-4f53-4fa7-bb32-11f34168b82b");
}

/// A define that cannot run restores the original and keeps the detail.
#[test]
fn test_rename_define_exec_error_rolls_back() {
    let (mock, virsh) = mock_with_p1(false, true);
    mock.fail_next(MockOp::Define, Fault::ExecError).unwrap();

    let err = PoolXml::rename("p1", "p2", None, virsh, mock.as_ref()).unwrap_err();
    match err {
        XmlError::Rename(msg) => {
            assert!(msg.contains("Error reported while defining pool"));
            assert!(msg.contains("injected failure"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.pool_names(), vec!["p1".to_string()]);
    assert!(!mock.is_pool_active("p1"));
}

/// When rollback fails too, the original error is still returned.
#[test]
fn test_rename_failed_rollback_keeps_original_error() {
    let (mock, virsh) = mock_with_p1(true, true);
    mock.fail_next(MockOp::Delete, Fault::Fail).unwrap();
    mock.fail_next(MockOp::Define, Fault::Fail).unwrap();
    mock.fail_next(MockOp::Start, Fault::Fail).unwrap();

    let err = PoolXml::rename("p1", "p2", None, virsh, mock.as_ref()).unwrap_err();
    assert!(matches!(err, XmlError::Rename(ref msg) if msg.contains("Delete pool p1")));
}

/// Unknown elements survive a load, an unrelated edit and a define.
#[test]
fn test_unknown_content_survives_define() {
    let (mock, virsh) = mock_with_p1(false, true);
    let xml = P1
        .replace("<source>", "<source><extra x='1'/>")
        .replace("</pool>", "<description>  two  spaces  </description></pool>");
    mock.insert_pool("p1", &xml, false, true).unwrap();

    let mut pool = PoolXml::new_from_dumpxml("p1", virsh).unwrap();
    pool.set_mode("0755").unwrap();
    assert!(pool.define());

    let stored = mock.pool_xml("p1").unwrap();
    assert!(stored.contains(r#"<extra x="1"/>"#));
    assert!(stored.contains("<mode>0755</mode>"));
    assert!(stored.contains("<description>  two  spaces  </description>"));
}

/// Backups land in the requested directory with the pool name up front.
#[test]
fn test_backup_and_restore() {
    let (mock, virsh) = mock_with_p1(false, true);
    let dir = tempfile::tempdir().unwrap();

    let path = PoolXml::backup_xml("p1", virsh.as_ref(), dir.path()).unwrap();
    assert!(path.starts_with(dir.path()));

    let saved = std::fs::read_to_string(&path).unwrap();
    let mut pool = PoolXml::from_text(saved, virsh);
    assert!(pool.undefine());
    assert!(mock.pool_names().is_empty());

    pool.set_xml(P1).unwrap();
    assert!(pool.define());
    assert_eq!(mock.pool_names(), vec!["p1".to_string()]);
}
