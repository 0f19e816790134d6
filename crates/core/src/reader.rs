//! Line reader - turns one producer stream into log entries
//!
//! Each descriptor received on the ingestion socket gets its own
//! `LineReader` task. Lines longer than the configured maximum are cut at
//! that length; the rest of the physical line is read and discarded.
//!
//! A reader never reports failure to anyone: on EOF, a read error, or when the
//! engine has gone away, it simply stops.

use std::io;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::EngineHandle;
use crate::entry::LogEntry;
use crate::stream::ProducerStream;

/// Default maximum line length, in bytes
pub const DEFAULT_MAX_LINE_LEN: usize = 1024;

/// Read buffer size for producer streams
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Reads newline-delimited entries from one producer
pub struct LineReader<R> {
    /// Producer stream
    reader: BufReader<R>,
    /// Tag attached to every entry
    source: Arc<str>,
    /// Maximum kept bytes per line
    max_line_len: usize,
    /// Where entries go
    engine: EngineHandle,
}

impl LineReader<ProducerStream> {
    /// Create a reader over a received descriptor
    ///
    /// Fails if the descriptor cannot be made non-blocking.
    pub fn from_fd(
        fd: OwnedFd,
        source: Arc<str>,
        max_line_len: usize,
        engine: EngineHandle,
    ) -> io::Result<Self> {
        let stream = ProducerStream::new(fd)?;
        Ok(Self::new(stream, source, max_line_len, engine))
    }
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Create a reader over any byte stream
    pub fn new(reader: R, source: Arc<str>, max_line_len: usize, engine: EngineHandle) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, reader),
            source,
            max_line_len: max_line_len.max(1),
            engine,
        }
    }

    /// Read until EOF or error
    ///
    /// Returns the number of entries emitted.
    pub async fn run(mut self) -> u64 {
        let mut line = Vec::with_capacity(self.max_line_len);
        let mut emitted = 0u64;

        loop {
            match read_line(&mut self.reader, &mut line, self.max_line_len).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    debug!(source = %self.source, error = %e, "log stream read failed");
                    break;
                }
            }

            let entry = LogEntry::new(Arc::clone(&self.source), decode_line(&line));
            if self.engine.log(entry).await.is_err() {
                break;
            }
            emitted += 1;
        }

        debug!(source = %self.source, lines = emitted, "log stream closed");
        emitted
    }

    /// Run the reader in a background task
    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }
}

/// Read one physical line into `line`, keeping at most `max_len` bytes
///
/// Returns `false` at EOF with nothing read. A final line without a newline is
/// still returned.
async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>, max_len: usize) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let mut seen_any = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(seen_any);
        }
        seen_any = true;

        let (chunk, consumed, done) = match find_newline(available) {
            Some(pos) => (&available[..pos], pos + 1, true),
            None => (available, available.len(), false),
        };

        let room = max_len.saturating_sub(line.len());
        line.extend_from_slice(&chunk[..chunk.len().min(room)]);
        reader.consume(consumed);

        if done {
            return Ok(true);
        }
    }
}

#[inline]
fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Strip a trailing carriage return and decode lossily
fn decode_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
#[path = "reader_test.rs"]
mod tests;
