//! Wire protocol for log ingestion and queries
//!
//! # Ingestion
//!
//! Producers send a datagram to the ingestion socket whose ancillary data
//! carries one or more open descriptors (`SCM_RIGHTS`) and whose payload is the
//! source tag. Every line later read from those descriptors is tagged with it.
//!
//! # Queries
//!
//! A client connects to the query socket and sends exactly one mode byte:
//!
//! ```text
//! 0x00  Dump         snapshot of the ring, then EOF
//! 0x01  Follow       live tail until disconnect
//! 0x02  DumpFollow   snapshot, then live tail
//! ```
//!
//! The server then streams text lines and never reads from the client again:
//!
//! ```text
//! <RFC3339 timestamp> <source> <message>\n
//! ```

use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::error::{LogdError, Result};

/// Maximum source tag length accepted on the ingestion socket
pub const MAX_TAG_LEN: usize = 512;

/// Mode discriminants
const MODE_DUMP: u8 = 0x00;
const MODE_FOLLOW: u8 = 0x01;
const MODE_DUMP_FOLLOW: u8 = 0x02;

/// Delivery mode requested by a query client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogMode {
    /// Snapshot of the ring, then EOF
    Dump,
    /// Live tail only
    Follow,
    /// Snapshot followed by live tail
    DumpFollow,
}

impl LogMode {
    /// Decode a mode byte
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            MODE_DUMP => Ok(Self::Dump),
            MODE_FOLLOW => Ok(Self::Follow),
            MODE_DUMP_FOLLOW => Ok(Self::DumpFollow),
            other => Err(LogdError::InvalidMode(other)),
        }
    }

    /// Encode as the wire byte
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Dump => MODE_DUMP,
            Self::Follow => MODE_FOLLOW,
            Self::DumpFollow => MODE_DUMP_FOLLOW,
        }
    }

    /// Whether the subscriber receives the ring snapshot
    #[inline]
    pub fn dumps(self) -> bool {
        matches!(self, Self::Dump | Self::DumpFollow)
    }

    /// Whether the subscriber receives entries appended after subscribing
    #[inline]
    pub fn follows(self) -> bool {
        matches!(self, Self::Follow | Self::DumpFollow)
    }
}

impl fmt::Display for LogMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dump => "dump",
            Self::Follow => "follow",
            Self::DumpFollow => "dump+follow",
        })
    }
}

/// Check that a source tag can appear in the line format unambiguously
///
/// The empty tag is allowed. Whitespace, control characters and `;` are not.
pub fn validate_source(tag: &str) -> Result<()> {
    let reason = if tag.len() > MAX_TAG_LEN {
        Some("too long")
    } else if tag.chars().any(char::is_whitespace) {
        Some("contains whitespace")
    } else if tag.chars().any(char::is_control) {
        Some("contains control characters")
    } else if tag.contains(';') {
        Some("contains ';'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(LogdError::InvalidSource {
            tag: tag.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// A line received from the query socket, split into its fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Timestamp as written by the daemon
    pub timestamp: DateTime<FixedOffset>,
    /// Source tag (may be empty)
    pub source: String,
    /// Message body
    pub message: String,
}

impl LogLine {
    /// Parse `<RFC3339> <source> <message>`, with or without the trailing newline
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let mut parts = line.splitn(3, ' ');

        let (Some(ts), Some(source)) = (parts.next(), parts.next()) else {
            return Err(LogdError::Protocol(format!("malformed log line: {line:?}")));
        };
        let timestamp = DateTime::parse_from_rfc3339(ts)
            .map_err(|e| LogdError::Protocol(format!("bad timestamp {ts:?}: {e}")))?;

        Ok(Self {
            timestamp,
            source: source.to_string(),
            message: parts.next().unwrap_or_default().to_string(),
        })
    }
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
