//! # virtpool Common
//!
//! Shared utilities for the virtpool binaries.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use virtpool_common::init_logging;
//!
//! init_logging("info")?;
//! tracing::info!(pool = "default", "Pool started");
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json};
