//! The `<source>` block of a pool definition.
//!
//! Which of these properties are meaningful depends on the pool type: a
//! `logical` pool uses `device_path` and `vg_name`, a `netfs` pool uses
//! `host_name`, `dir_path` and `format_type`, an `iscsi` pool adds `hosts`,
//! authentication and an initiator IQN, and so on.

use std::collections::BTreeMap;

use crate::accessors::{
    accessor_methods, XmlAttribute, XmlElementList, XmlElementText,
};
use crate::base::LibvirtXml;
use crate::document::XmlTreeFile;
use crate::error::{Result, XmlError};

/// Attributes of one `<host>` entry, e.g. `{"name": "h1", "port": "3260"}`.
pub type HostAttrs = BTreeMap<String, String>;

/// Typed view over a `<source>` element.
#[derive(Debug, PartialEq)]
pub struct SourceXml {
    xml: XmlTreeFile,
}

impl SourceXml {
    const DEVICE_PATH: XmlAttribute = XmlAttribute::new("device_path", "/", "device", "path");
    const VG_NAME: XmlElementText = XmlElementText::new("vg_name", "/", "name");
    const HOST_NAME: XmlAttribute = XmlAttribute::new("host_name", "/", "host", "name");
    const DIR_PATH: XmlAttribute = XmlAttribute::new("dir_path", "/", "dir", "path");
    const ADP_TYPE: XmlAttribute = XmlAttribute::new("adp_type", "/", "adapter", "type");
    const ADP_NAME: XmlAttribute = XmlAttribute::new("adp_name", "/", "adapter", "name");
    const ADP_PARENT: XmlAttribute = XmlAttribute::new("adp_parent", "/", "adapter", "parent");
    const ADP_WWNN: XmlAttribute = XmlAttribute::new("adp_wwnn", "/", "adapter", "wwnn");
    const ADP_WWPN: XmlAttribute = XmlAttribute::new("adp_wwpn", "/", "adapter", "wwpn");
    const FORMAT_TYPE: XmlAttribute = XmlAttribute::new("format_type", "/", "format", "type");
    const HOSTS: XmlElementList<HostAttrs> =
        XmlElementList::new("hosts", "/", marshal_from_host, marshal_to_host);
    const AUTH_TYPE: XmlAttribute = XmlAttribute::new("auth_type", "/", "auth", "type");
    const AUTH_USERNAME: XmlAttribute =
        XmlAttribute::new("auth_username", "/", "auth", "username");
    const SECRET_USAGE: XmlAttribute = XmlAttribute::new("secret_usage", "/auth", "secret", "usage");
    const SECRET_UUID: XmlAttribute = XmlAttribute::new("secret_uuid", "/auth", "secret", "uuid");
    const IQN_NAME: XmlAttribute = XmlAttribute::new("iqn_name", "/initiator", "iqn", "name");
    const PROTOCOL_VER: XmlAttribute = XmlAttribute::new("protocol_ver", "/", "protocol", "ver");

    /// An empty `<source/>` block.
    pub fn new() -> Self {
        Self::empty()
    }

    accessor_methods! {
        /// Block device backing the pool (`device@path`).
        device_path / set_device_path / del_device_path: String => Self::DEVICE_PATH;
        /// Volume group name of a logical pool.
        vg_name / set_vg_name / del_vg_name: String => Self::VG_NAME;
        /// First source host (`host@name`).
        host_name / set_host_name / del_host_name: String => Self::HOST_NAME;
        /// Exported directory (`dir@path`).
        dir_path / set_dir_path / del_dir_path: String => Self::DIR_PATH;
        adp_type / set_adp_type / del_adp_type: String => Self::ADP_TYPE;
        adp_name / set_adp_name / del_adp_name: String => Self::ADP_NAME;
        adp_parent / set_adp_parent / del_adp_parent: String => Self::ADP_PARENT;
        adp_wwnn / set_adp_wwnn / del_adp_wwnn: String => Self::ADP_WWNN;
        adp_wwpn / set_adp_wwpn / del_adp_wwpn: String => Self::ADP_WWPN;
        format_type / set_format_type / del_format_type: String => Self::FORMAT_TYPE;
        /// Every `<host>` entry, in document order.
        hosts / set_hosts / del_hosts: Vec<HostAttrs> => Self::HOSTS;
        auth_type / set_auth_type / del_auth_type: String => Self::AUTH_TYPE;
        auth_username / set_auth_username / del_auth_username: String => Self::AUTH_USERNAME;
        secret_usage / set_secret_usage / del_secret_usage: String => Self::SECRET_USAGE;
        secret_uuid / set_secret_uuid / del_secret_uuid: String => Self::SECRET_UUID;
        /// Initiator IQN of an iSCSI pool.
        iqn_name / set_iqn_name / del_iqn_name: String => Self::IQN_NAME;
        protocol_ver / set_protocol_ver / del_protocol_ver: String => Self::PROTOCOL_VER;
    }
}

impl Default for SourceXml {
    fn default() -> Self {
        Self::new()
    }
}

impl LibvirtXml for SourceXml {
    const ROOT_TAG: &'static str = "source";

    fn from_xml(xml: XmlTreeFile) -> Self {
        Self { xml }
    }

    fn xml(&self) -> &XmlTreeFile {
        &self.xml
    }

    fn xml_mut(&mut self) -> &mut XmlTreeFile {
        &mut self.xml
    }
}

fn marshal_from_host(item: &HostAttrs) -> Result<(String, Vec<(String, String)>)> {
    if item.is_empty() {
        return Err(XmlError::malformed("hosts", "host entry has no attributes"));
    }
    let attributes = item.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    Ok(("host".to_string(), attributes))
}

fn marshal_to_host(tag: &str, attributes: &[(String, String)]) -> Option<HostAttrs> {
    if tag != "host" {
        return None;
    }
    Some(attributes.iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(pairs: &[(&str, &str)]) -> HostAttrs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_new_source_is_empty() {
        let source = SourceXml::new();
        assert_eq!(source.xml_string().unwrap(), "<source/>");
        assert!(source.device_path().unwrap_err().is_not_found());
        assert!(source.hosts().unwrap_err().is_not_found());
    }

    #[test]
    fn test_logical_source() {
        let mut source = SourceXml::new();
        source.set_device_path("/dev/sdb1").unwrap();
        source.set_vg_name("vg0").unwrap();
        assert_eq!(source.device_path().unwrap(), "/dev/sdb1");
        assert_eq!(source.vg_name().unwrap(), "vg0");
    }

    #[test]
    fn test_adapter_attributes_share_one_element() {
        let mut source = SourceXml::new();
        source.set_adp_type("fc_host").unwrap();
        source.set_adp_wwnn("20000000c9831b4b").unwrap();
        source.set_adp_wwpn("10000000c9831b4b").unwrap();

        let root = source.xml().root().unwrap();
        assert_eq!(root.elements().count(), 1);
        assert_eq!(source.adp_wwnn().unwrap(), "20000000c9831b4b");

        source.del_adp_type().unwrap();
        source.del_adp_wwnn().unwrap();
        assert!(source.xml().find("/adapter").unwrap().is_some());
        source.del_adp_wwpn().unwrap();
        assert!(source.xml().find("/adapter").unwrap().is_none());
    }

    #[test]
    fn test_auth_secret_nested_under_auth() {
        let mut source = SourceXml::new();
        source.set_auth_type("chap").unwrap();
        source.set_auth_username("admin").unwrap();
        source.set_secret_usage("libvirtiscsi").unwrap();

        let secret = source.xml().find("/auth/secret").unwrap().unwrap();
        assert_eq!(secret.attr("usage"), Some("libvirtiscsi"));
        assert_eq!(source.auth_username().unwrap(), "admin");
    }

    #[test]
    fn test_hosts_round_trip() {
        let mut source = SourceXml::new();
        let hosts = vec![host(&[("name", "h1"), ("port", "100")]), host(&[("name", "h2")])];
        source.set_hosts(hosts.clone()).unwrap();
        assert_eq!(source.hosts().unwrap(), hosts);
        assert_eq!(source.host_name().unwrap(), "h1");
    }

    #[test]
    fn test_hosts_reject_bad_entries() {
        let mut source = SourceXml::new();
        let err = source.set_hosts(vec![HostAttrs::new()]).unwrap_err();
        assert!(matches!(err, XmlError::MalformedInput { .. }));

        let err = source
            .set_hosts(vec![host(&[("1port", "100")])])
            .unwrap_err();
        assert!(matches!(err, XmlError::MalformedInput { .. }));
        assert_eq!(source.xml_string().unwrap(), "<source/>");
    }

    #[test]
    fn test_hosts_skip_other_children() {
        let source = SourceXml::from_text(
            "<source><host name='a'/><device path='/dev/sda'/><host name='b' port='3260'/></source>",
        );
        let hosts = source.hosts().unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[1].get("port").map(String::as_str), Some("3260"));
    }
}
