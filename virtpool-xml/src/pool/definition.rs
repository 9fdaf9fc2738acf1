//! Pool definitions: the `<pool>` document and its bound properties.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::accessors::{
    accessor_methods, XmlAttribute, XmlElementInt, XmlElementNest, XmlElementText,
};
use crate::base::LibvirtXml;
use crate::document::XmlTreeFile;
use crate::error::{Result, XmlError};
use crate::tree::{is_valid_name, Element};
use crate::virsh::Virsh;

use super::source::SourceXml;

/// Bound properties of a `<pool>` document, without any `virsh` handle.
///
/// ```text
/// <pool type='dir'>                       pool_type
///   <name>p1</name>                       name
///   <uuid>...</uuid>                      uuid
///   <capacity>..</capacity>               capacity / allocation / available
///   <source>...</source>                  source (SourceXml)
///   <target>
///     <path>/var/lib/p1</path>            target_path
///     <permissions>
///       <mode>0755</mode>                 mode
///       <owner>0</owner>                  owner / group
///     </permissions>
///   </target>
/// </pool>
/// ```
#[derive(Debug, PartialEq)]
pub struct PoolXmlBase {
    xml: XmlTreeFile,
}

impl PoolXmlBase {
    const POOL_TYPE: XmlAttribute = XmlAttribute::new("pool_type", "/", "pool", "type");
    const NAME: XmlElementText = XmlElementText::new("name", "/", "name");
    const UUID: XmlElementText = XmlElementText::new("uuid", "/", "uuid");
    const CAPACITY: XmlElementInt<u64> = XmlElementInt::new("capacity", "/", "capacity");
    const ALLOCATION: XmlElementInt<u64> = XmlElementInt::new("allocation", "/", "allocation");
    const AVAILABLE: XmlElementInt<u64> = XmlElementInt::new("available", "/", "available");
    const SOURCE: XmlElementNest<SourceXml> = XmlElementNest::new("source", "/", "source");
    const TARGET_PATH: XmlElementText = XmlElementText::new("target_path", "/target", "path");
    const MODE: XmlElementText = XmlElementText::new("mode", "/target/permissions", "mode");
    const OWNER: XmlElementInt<i64> = XmlElementInt::new("owner", "/target/permissions", "owner");
    const GROUP: XmlElementInt<i64> = XmlElementInt::new("group", "/target/permissions", "group");

    accessor_methods! {
        /// Pool type, the `type` attribute of the root element.
        pool_type / set_pool_type / del_pool_type: String => Self::POOL_TYPE;
        name / set_name / del_name: String => Self::NAME;
        /// Pool uuid. Deleting it lets libvirt assign a new one on define.
        uuid / set_uuid / del_uuid: String => Self::UUID;
        /// Total capacity in bytes.
        capacity / set_capacity / del_capacity: u64 => Self::CAPACITY;
        allocation / set_allocation / del_allocation: u64 => Self::ALLOCATION;
        available / set_available / del_available: u64 => Self::AVAILABLE;
        /// Copy of the `<source>` block. Write it back with `set_source`.
        source / set_source / del_source: SourceXml => Self::SOURCE;
        target_path / set_target_path / del_target_path: String => Self::TARGET_PATH;
        mode / set_mode / del_mode: String => Self::MODE;
        owner / set_owner / del_owner: i64 => Self::OWNER;
        group / set_group / del_group: i64 => Self::GROUP;
    }

    /// Append `<tag attr.../>` to the existing `<source>` block.
    ///
    /// Does nothing when the pool has no source block.
    pub fn add_source(&mut self, tag: &str, attributes: &[(&str, &str)]) -> Result<()> {
        if !is_valid_name(tag) {
            return Err(XmlError::malformed("source", format!("invalid element name {tag:?}")));
        }
        if let Some((key, _)) = attributes.iter().find(|(k, _)| !is_valid_name(k)) {
            return Err(XmlError::malformed("source", format!("invalid attribute name {key:?}")));
        }

        if let Some(source) = self.xml.find_mut("/source")? {
            source.push_child(Element::with_attributes(tag, attributes.iter().copied()));
        }
        self.xml.write()
    }
}

impl LibvirtXml for PoolXmlBase {
    const ROOT_TAG: &'static str = "pool";

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

/// Selected fields of a defined pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolDetails {
    #[serde(rename = "type")]
    pub pool_type: String,
    pub uuid: String,
    pub capacity: u64,
    pub allocation: u64,
    pub available: u64,
    /// Absent for `gluster` pools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
}

/// A pool definition together with the `virsh` used to apply it.
///
/// Dereferences to [`PoolXmlBase`] for property access.
pub struct PoolXml {
    base: PoolXmlBase,
    virsh: Arc<dyn Virsh>,
}

impl PoolXml {
    /// A new, empty definition of the given pool type.
    pub fn new(pool_type: &str, virsh: Arc<dyn Virsh>) -> Self {
        let root = Element::with_attributes("pool", [("type", pool_type)]);
        Self::from_base(PoolXmlBase::from_xml(XmlTreeFile::from_element(root)), virsh)
    }

    pub fn from_base(base: PoolXmlBase, virsh: Arc<dyn Virsh>) -> Self {
        Self { base, virsh }
    }

    /// Wrap existing definition text.
    pub fn from_text(text: impl Into<String>, virsh: Arc<dyn Virsh>) -> Self {
        Self::from_base(PoolXmlBase::from_text(text), virsh)
    }

    /// The current definition of a named pool.
    #[instrument(skip(virsh))]
    pub fn new_from_dumpxml(name: &str, virsh: Arc<dyn Virsh>) -> Result<Self> {
        let xml = virsh.pool_dumpxml(name)?;
        debug!(bytes = xml.len(), "Dumped pool XML");
        Ok(Self::from_text(xml, virsh))
    }

    /// Type of a named pool.
    pub fn get_type(name: &str, virsh: Arc<dyn Virsh>) -> Result<String> {
        Self::new_from_dumpxml(name, virsh)?.pool_type()
    }

    /// Type, uuid, sizes and target path of a named pool.
    pub fn get_pool_details(name: &str, virsh: Arc<dyn Virsh>) -> Result<PoolDetails> {
        let pool = Self::new_from_dumpxml(name, virsh)?;
        let pool_type = pool.pool_type()?;
        let target_path = match pool_type.as_str() {
            "gluster" => None,
            _ => Some(pool.target_path()?),
        };
        Ok(PoolDetails {
            uuid: pool.uuid()?,
            capacity: pool.capacity()?,
            allocation: pool.allocation()?,
            available: pool.available()?,
            target_path,
            pool_type,
        })
    }

    pub fn virsh(&self) -> &Arc<dyn Virsh> {
        &self.virsh
    }

    pub fn into_base(self) -> PoolXmlBase {
        self.base
    }

    /// An independent copy sharing the same `virsh` handle.
    pub fn copy(&self) -> Result<Self> {
        Ok(Self {
            base: PoolXmlBase::from_xml(self.base.xml().copy()?),
            virsh: Arc::clone(&self.virsh),
        })
    }

    /// Log the serialized definition line by line.
    pub fn debug_xml(&self) {
        match self.xml_string() {
            Ok(xml) => {
                for line in xml.lines() {
                    debug!("Pool XML: {}", line);
                }
            }
            Err(e) => error!(error = %e, "Cannot serialize pool XML"),
        }
    }
}

impl Deref for PoolXml {
    type Target = PoolXmlBase;

    fn deref(&self) -> &PoolXmlBase {
        &self.base
    }
}

impl DerefMut for PoolXml {
    fn deref_mut(&mut self) -> &mut PoolXmlBase {
        &mut self.base
    }
}

impl PartialEq for PoolXml {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl fmt::Debug for PoolXml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolXml").field("xml", self.base.xml()).finish()
    }
}

impl fmt::Display for PoolXml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.base.xml(), f)
    }
}
