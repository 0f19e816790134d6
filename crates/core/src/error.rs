//! Error types for the memlogd core

use std::io;
use thiserror::Error;

/// Errors that can occur in the log daemon
#[derive(Error, Debug)]
pub enum LogdError {
    /// I/O error (socket and descriptor operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (malformed query or ancillary data)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Mode byte outside the known set
    #[error("invalid query mode: {0}")]
    InvalidMode(u8),

    /// Source tag rejected at registration
    #[error("invalid source tag {tag:?}: {reason}")]
    InvalidSource { tag: String, reason: &'static str },

    /// The engine loop has stopped and no longer accepts messages
    #[error("engine stopped")]
    EngineStopped,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for daemon operations
pub type Result<T> = std::result::Result<T, LogdError>;
