//! # virtpool XML
//!
//! Typed access to libvirt storage pool XML, plus the pool lifecycle
//! operations built on top of it.
//!
//! Schema types expose properties backed directly by an XML tree. Nothing is
//! cached: every read walks the live document and every write updates it
//! (and its backing file, if any) immediately. Elements and attributes the
//! schema does not know about are preserved.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │   PoolXml  (define, undefine, rename, backup) │
//! └──────────────┬─────────────────────┬──────────┘
//!                │ Deref               │ Arc<dyn Virsh>
//!                ▼                     ▼
//! ┌───────────────────────────┐  ┌────────────────────────┐
//! │ PoolXmlBase / SourceXml   │  │ Virsh + StoragePool    │
//! │ (bound properties)        │  │ VirshCommand/MockVirsh │
//! └──────────────┬────────────┘  └────────────────────────┘
//!                │ Accessor bindings
//!                ▼
//! ┌───────────────────────────┐
//! │ XmlTreeFile (tree + file) │
//! └───────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use virtpool_xml::{PoolXml, Virsh, VirshCommand};
//!
//! let virsh = Arc::new(VirshCommand::new());
//! let mut pool = PoolXml::new("dir", virsh.clone());
//! pool.set_name("images")?;
//! pool.set_target_path("/var/lib/images")?;
//! assert!(pool.define());
//!
//! PoolXml::rename("images", "images-old", None, virsh.clone(), virsh.as_ref())?;
//! ```

pub mod accessors;
pub mod base;
pub mod document;
pub mod error;
pub mod mock;
pub mod pool;
pub mod tree;
pub mod virsh;

pub use accessors::{
    Accessor, XmlAttribute, XmlElementInt, XmlElementList, XmlElementNest, XmlElementText,
};
pub use base::LibvirtXml;
pub use document::XmlTreeFile;
pub use error::{Result, XmlError};
pub use mock::MockVirsh;
pub use pool::{
    HostAttrs, PoolCapabilities, PoolCapabilityXml, PoolDetails, PoolXml, PoolXmlBase, SourceXml,
};
pub use tree::Element;
pub use virsh::{CmdResult, StoragePool, Virsh, VirshCommand};
