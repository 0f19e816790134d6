//! memlogd Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! An empty file is a valid configuration.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use memlogd_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[memlogd]\nmax_lines = 100").unwrap();
//! assert_eq!(config.memlogd.max_lines, 100);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [log]
//! level = "info"
//! output = "stderr"
//!
//! [memlogd]
//! socket_log = "/var/run/linuxkit-external-logging.sock"
//! socket_query = "/var/run/memlogdq.sock"
//! max_lines = 5000
//! max_line_len = 1024
//! ```

mod daemon;
mod error;
mod logging;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use daemon::DaemonConfig;
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogOutput};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Daemon sockets and sizing
    pub memlogd: DaemonConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Call again after applying command-line overrides.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
