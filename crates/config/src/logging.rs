//! Diagnostic logging for the daemon itself
//!
//! Separate from the lines memlogd stores for its producers. Stdout carries
//! the entry echo, so diagnostics default to stderr.

use std::path::PathBuf;

use serde::Deserialize;

/// Diagnostic output format
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    Json,
}

/// Diagnostic output destination: `"stdout"`, `"stderr"` or a file path
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    #[default]
    Stderr,
    #[serde(untagged)]
    File(PathBuf),
}

/// `[log]` section
///
/// ```toml
/// [log]
/// level = "info,memlogd_core::receiver=debug"
/// format = "json"
/// output = "/var/log/memlogd.log"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives; a bare level such as `debug` also works
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            output: LogOutput::default(),
        }
    }
}
