//! Logging initialization using tracing.
//!
//! Logs always go to stderr so that command output on stdout stays
//! machine-readable. `RUST_LOG`, when set, overrides the given level.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| anyhow!("Invalid log level '{}': {}", level, e)),
    }
}

/// Initialize the tracing subscriber with human-readable output.
///
/// # Arguments
/// * `level` - Log level or filter directive (trace, debug, info, warn, error)
pub fn init_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter(level)?)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_target(true),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

/// Initialize logging with JSON output, one object per line.
pub fn init_logging_json(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter(level)?)
        .with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_current_span(true),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(filter("pool=loud").is_err());
        }
        assert!(filter("debug").is_ok());
    }

    #[test]
    fn test_second_init_fails() {
        assert!(init_logging("info").is_ok());
        assert!(init_logging_json("info").is_err());
    }
}
