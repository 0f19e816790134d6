//! Daemon configuration
//!
//! Socket locations and buffer sizing for memlogd.

use std::path::PathBuf;

use memlogd_core::{
    DEFAULT_INGRESS_QUEUE, DEFAULT_LOG_SOCKET_PATH, DEFAULT_MAX_LINE_LEN, DEFAULT_QUERY_SOCKET_PATH,
    DEFAULT_RING_CAPACITY,
};
use serde::Deserialize;

/// Daemon configuration
///
/// # Example
///
/// ```toml
/// [memlogd]
/// socket_log = "/run/memlogd/log.sock"
/// socket_query = "/run/memlogd/query.sock"
/// max_lines = 10000
/// max_line_len = 2048
/// output_buffer = 500
/// echo = false
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Ingestion socket path, used unless `fd_log` is set
    pub socket_log: PathBuf,

    /// Query socket path, used unless `fd_query` is set
    pub socket_query: PathBuf,

    /// Inherited ingestion socket descriptor
    pub fd_log: Option<i32>,

    /// Inherited query socket descriptor
    pub fd_query: Option<i32>,

    /// Number of lines kept in memory
    pub max_lines: usize,

    /// Maximum stored line length; longer lines are truncated
    pub max_line_len: usize,

    /// Per-client queue size
    /// Default: same as `max_lines`
    pub output_buffer: Option<usize>,

    /// Depth of the channel between line readers and the ring
    pub ingress_queue: usize,

    /// Copy every stored line to stdout
    pub echo: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_log: PathBuf::from(DEFAULT_LOG_SOCKET_PATH),
            socket_query: PathBuf::from(DEFAULT_QUERY_SOCKET_PATH),
            fd_log: None,
            fd_query: None,
            max_lines: DEFAULT_RING_CAPACITY,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            output_buffer: None,
            ingress_queue: DEFAULT_INGRESS_QUEUE,
            echo: true,
        }
    }
}

impl DaemonConfig {
    /// Effective per-client queue size
    pub fn output_buffer(&self) -> usize {
        self.output_buffer.unwrap_or(self.max_lines)
    }
}
