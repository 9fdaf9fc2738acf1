//! `virsh pool-capabilities`.

use std::collections::BTreeMap;

use crate::base::LibvirtXml;
use crate::document::XmlTreeFile;
use crate::error::Result;
use crate::tree::Element;
use crate::virsh::Virsh;

/// Key used when a pool type has no `<poolOptions>` or no default format.
pub const POOL_DEFAULT_FORMAT_PLACEHOLDER: &str = "pool_default_format_name";
/// Key used when a pool type has no `<volOptions>` or no default format.
pub const VOL_DEFAULT_FORMAT_PLACEHOLDER: &str = "vol_default_format_name";

/// `{pool_type: {default_format: [supported formats]}}`.
pub type PoolCapabilities = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// The host's storage pool capabilities document.
#[derive(Debug, PartialEq)]
pub struct PoolCapabilityXml {
    xml: XmlTreeFile,
}

impl PoolCapabilityXml {
    /// Load the capabilities of the host behind `virsh`.
    pub fn new(virsh: &dyn Virsh) -> Result<Self> {
        Ok(Self::from_text(virsh.pool_capabilities()?))
    }

    /// Supported formats per pool type.
    ///
    /// Each pool type maps the name of its default pool format to the pool
    /// formats from `<poolOptions>`, and the name of its default volume
    /// format to the volume formats from `<volOptions>`. A missing options
    /// block is recorded as an empty list under the placeholder key. `rbd`
    /// volume formats are always empty.
    pub fn get_pool_capabilities(&self) -> Result<PoolCapabilities> {
        let mut capabilities = PoolCapabilities::new();

        for pool in self.xml.find_all("/pool")? {
            let pool_type = pool.attr("type").unwrap_or_default().to_string();
            let info = capabilities.entry(pool_type.clone()).or_default();

            match pool.child("poolOptions") {
                Some(options) => {
                    let (name, values) = read_options(options, POOL_DEFAULT_FORMAT_PLACEHOLDER);
                    info.insert(name, values);
                }
                None => {
                    info.insert(POOL_DEFAULT_FORMAT_PLACEHOLDER.to_string(), Vec::new());
                }
            }

            match pool.child("volOptions") {
                Some(options) => {
                    let (name, mut values) = read_options(options, VOL_DEFAULT_FORMAT_PLACEHOLDER);
                    if pool_type == "rbd" {
                        values.clear();
                    }
                    info.insert(name, values);
                }
                None => {
                    info.insert(VOL_DEFAULT_FORMAT_PLACEHOLDER.to_string(), Vec::new());
                }
            }
        }
        Ok(capabilities)
    }
}

/// Default format name (last `<defaultFormat>` wins) and enum values.
fn read_options(options: &Element, placeholder: &str) -> (String, Vec<String>) {
    let name = options
        .elements()
        .filter(|e| e.name == "defaultFormat")
        .filter_map(|e| e.attr("type"))
        .last()
        .unwrap_or(placeholder)
        .to_string();
    let values = options
        .child("enum")
        .into_iter()
        .flat_map(Element::elements)
        .filter(|e| e.name == "value")
        .filter_map(Element::text)
        .collect();
    (name, values)
}

impl LibvirtXml for PoolCapabilityXml {
    const ROOT_TAG: &'static str = "storagepoolCapabilities";

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockVirsh, SAMPLE_POOL_CAPABILITIES};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_sample_capabilities() {
        let caps = PoolCapabilityXml::from_text(SAMPLE_POOL_CAPABILITIES)
            .get_pool_capabilities()
            .unwrap();
        assert_eq!(caps.len(), 4);

        let dir = &caps["dir"];
        assert_eq!(dir[POOL_DEFAULT_FORMAT_PLACEHOLDER], Vec::<String>::new());
        assert_eq!(dir["raw"], strings(&["none", "raw", "qcow2"]));

        let fs = &caps["fs"];
        assert_eq!(fs["auto"], strings(&["auto", "ext4", "xfs"]));
        assert_eq!(fs["raw"], strings(&["raw", "qcow2"]));

        let logical = &caps["logical"];
        assert_eq!(logical["lvm2"], strings(&["unknown", "lvm2"]));
        assert_eq!(logical[VOL_DEFAULT_FORMAT_PLACEHOLDER], Vec::<String>::new());
    }

    #[test]
    fn test_rbd_volume_formats_are_empty() {
        let caps = PoolCapabilityXml::from_text(
            "<storagepoolCapabilities><pool type='rbd'><volOptions>\
             <defaultFormat type='raw'/><enum name='targetFormatType'><value>raw</value></enum>\
             </volOptions></pool></storagepoolCapabilities>",
        )
        .get_pool_capabilities()
        .unwrap();
        assert_eq!(caps["rbd"]["raw"], Vec::<String>::new());
    }

    #[test]
    fn test_missing_default_format_uses_placeholder() {
        let caps = PoolCapabilityXml::from_text(
            "<storagepoolCapabilities><pool type='disk'><poolOptions>\
             <enum name='sourceFormatType'><value>dos</value></enum>\
             </poolOptions></pool></storagepoolCapabilities>",
        )
        .get_pool_capabilities()
        .unwrap();
        assert_eq!(caps["disk"][POOL_DEFAULT_FORMAT_PLACEHOLDER], strings(&["dos"]));
    }

    #[test]
    fn test_load_through_virsh() {
        let virsh = MockVirsh::new();
        let caps = PoolCapabilityXml::new(&virsh).unwrap();
        assert!(caps.get_pool_capabilities().unwrap().contains_key("fs"));

        virsh
            .set_capabilities(
                "<storagepoolCapabilities><pool type='iscsi'><poolOptions>\
                 <enum name='sourceFormatType'/></poolOptions></pool></storagepoolCapabilities>",
            )
            .unwrap();
        let caps = PoolCapabilityXml::new(&virsh)
            .unwrap()
            .get_pool_capabilities()
            .unwrap();
        assert_eq!(caps.keys().collect::<Vec<_>>(), vec!["iscsi"]);
        assert_eq!(caps["iscsi"][POOL_DEFAULT_FORMAT_PLACEHOLDER], Vec::<String>::new());
    }
}
