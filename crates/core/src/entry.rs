//! Log entries
//!
//! A `LogEntry` is created once by a line reader (or by the daemon itself) and
//! then shared read-only, behind an `Arc`, between the ring buffer and every
//! subscriber queue that holds it.

use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, SecondsFormat, Utc};

/// Source tag used for entries the daemon writes about itself
pub const INTERNAL_SOURCE: &str = "memlogd";

/// A single log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Time the line was read by the daemon
    pub timestamp: DateTime<Utc>,
    /// Tag of the producer that wrote the line
    pub source: Arc<str>,
    /// Line body, without the line terminator
    pub message: String,
}

impl LogEntry {
    /// Create an entry stamped with the current time
    pub fn new(source: Arc<str>, message: impl Into<String>) -> Self {
        Self::at(Utc::now(), source, message)
    }

    /// Create an entry with an explicit timestamp
    pub fn at(timestamp: DateTime<Utc>, source: Arc<str>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            source,
            message: message.into(),
        }
    }

    /// Create an entry attributed to the daemon itself
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Arc::from(INTERNAL_SOURCE), message)
    }

    /// Append the wire form (`<RFC3339> <source> <message>\n`) to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_slice(
            self.timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, true)
                .as_bytes(),
        );
        buf.put_u8(b' ');
        buf.put_slice(self.source.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.message.as_bytes());
        buf.put_u8(b'\n');
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.source,
            self.message
        )
    }
}
