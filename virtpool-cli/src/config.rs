//! Configuration management for the virtpool CLI.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use virtpool_xml::VirshCommand;

use crate::cli::Args;

/// Location used when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/virtpool/virtpool.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How to run virsh
    pub virsh: VirshConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

/// virsh invocation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirshConfig {
    /// virsh binary, looked up in PATH unless absolute
    pub binary: String,
    /// Connection URI (`virsh -c`), libvirt's default if unset
    pub uri: Option<String>,
    /// Directory for define input files and backups
    pub tmp_dir: PathBuf,
}

impl Default for VirshConfig {
    fn default() -> Self {
        Self {
            binary: "virsh".to_string(),
            uri: None,
            tmp_dir: std::env::temp_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit` if given, else the default file if it exists, else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::load(Path::new(DEFAULT_CONFIG_PATH)) {
                Err(ConfigError::NotFound(_)) => Ok(Self::default()),
                other => other,
            },
        }
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref uri) = args.uri {
            self.virsh.uri = Some(uri.clone());
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if args.json_logs {
            self.logging.format = LogFormat::Json;
        }

        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.virsh.binary.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "virsh.binary".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.virsh.uri.as_deref().is_some_and(|uri| uri.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "virsh.uri".to_string(),
                message: "must not be empty when set".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                message: format!("must be one of: {:?}", valid_levels),
            });
        }

        Ok(())
    }

    /// The virsh runner described by this configuration.
    pub fn virsh_command(&self) -> VirshCommand {
        let command = VirshCommand::new()
            .with_binary(&self.virsh.binary)
            .with_tmp_dir(&self.virsh.tmp_dir);
        match &self.virsh.uri {
            Some(uri) => command.with_uri(uri),
            None => command,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
