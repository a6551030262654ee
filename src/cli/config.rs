//! ringtally configuration file handling
//!
//! Provides default configuration generation and loading. Configuration files
//! are TOML and live at `<data_dir>/ringtally/config.toml` unless a path is
//! given on the command line.
//!
//! Every section is optional; missing keys fall back to defaults.

use ringtally::tally::{PolicyConfig, PolicyError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write config file '{path}': {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("invalid policy: {0}")]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingtallyConfig {
    /// Decision thresholds
    pub policy: PolicyConfig,

    pub storage: StorageConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file (in-memory stores when not set)
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl RingtallyConfig {
    /// Load configuration from a TOML file and validate the policy
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: RingtallyConfig =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.policy.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the default location if it exists,
    /// otherwise built-in defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = default_config_path();
                if default.exists() {
                    Self::load(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        write_creating_parent(path, &contents)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml() -> String {
        let policy = PolicyConfig::default();
        format!(
            r#"# ringtally configuration

[policy]
# Votes required before approve/reject can be decided
quorum = {quorum}

# More escalate votes than this escalates regardless of quorum
escalation_threshold = {escalation_threshold}

# At quorum, |approve - reject| at or below this is a tie and escalates
tie_margin = {tie_margin}

[storage]
# SQLite database for submissions and tallies (optional)
# Leave commented to keep everything in memory
# database = "/var/lib/ringtally/ringtally.db"

[logging]
# Log level: trace, debug, info, warn, error
# RUST_LOG overrides this when set
level = "{level}"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/ringtally/ringtally.log"
"#,
            quorum = policy.quorum,
            escalation_threshold = policy.escalation_threshold,
            tie_margin = policy.tie_margin,
            level = DEFAULT_LOG_LEVEL,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path) -> Result<(), ConfigError> {
        write_creating_parent(config_path, &Self::generate_default_toml())
    }
}

fn write_creating_parent(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, contents).map_err(write_err)
}

/// Get the default config file path: `<data_dir>/ringtally/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ringtally")
        .join("config.toml")
}
