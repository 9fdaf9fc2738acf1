//! Storage pool schema types and lifecycle operations.

mod capability;
mod definition;
mod lifecycle;
mod source;

pub use capability::{
    PoolCapabilities, PoolCapabilityXml, POOL_DEFAULT_FORMAT_PLACEHOLDER,
    VOL_DEFAULT_FORMAT_PLACEHOLDER,
};
pub use definition::{PoolDetails, PoolXml, PoolXmlBase};
pub use source::{HostAttrs, SourceXml};
