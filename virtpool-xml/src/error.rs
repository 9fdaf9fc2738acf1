//! Error types for the pool XML accessor layer.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading, writing or applying pool XML.
#[derive(Error, Debug)]
pub enum XmlError {
    /// A read targeted an element or attribute that does not exist.
    #[error("{property} not found at '{xpath}'")]
    ElementNotFound { property: String, xpath: String },

    /// A write received a value of the wrong shape.
    #[error("Malformed value for {property}: {message}")]
    MalformedInput { property: String, message: String },

    /// Stored text could not be decoded into the declared type.
    #[error("Invalid value {value:?} for {property}: {message}")]
    InvalidValue {
        property: String,
        value: String,
        message: String,
    },

    /// The document is not well-formed XML.
    #[error("XML parse error: {0}")]
    Parse(String),

    /// An accessor path could not be interpreted.
    #[error("Invalid xpath: {0}")]
    InvalidXpath(String),

    /// Reading or writing a backing file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external command could not run or reported failure.
    #[error("{command} failed (status {status:?}): {stderr}")]
    ExternalCommand {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// Renaming a pool failed; the original definition was restored if possible.
    #[error("Pool rename failed: {0}")]
    Rename(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl XmlError {
    pub(crate) fn not_found(property: &str, xpath: impl Into<String>) -> Self {
        XmlError::ElementNotFound {
            property: property.to_string(),
            xpath: xpath.into(),
        }
    }

    pub(crate) fn malformed(property: &str, message: impl Into<String>) -> Self {
        XmlError::MalformedInput {
            property: property.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        XmlError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error reports missing data rather than a real failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, XmlError::ElementNotFound { .. })
    }
}

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        XmlError::Parse(e.to_string())
    }
}

/// Result type alias for pool XML operations.
pub type Result<T> = std::result::Result<T, XmlError>;
