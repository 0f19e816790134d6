//! Ingestion socket - receives producer descriptors
//!
//! Producers register by sending a datagram whose payload is their source tag
//! and whose ancillary data carries the descriptors to read. Each descriptor
//! gets its own [`LineReader`] task.

use std::os::fd::AsFd;
use std::sync::Arc;

use tokio::io::Interest;
use tokio::net::UnixDatagram;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::EngineHandle;
use crate::error::{LogdError, Result};
use crate::protocol::validate_source;
use crate::reader::{DEFAULT_MAX_LINE_LEN, LineReader};
use crate::scm::{ReceivedMessage, recv_with_fds};

/// Payload buffer size; longer tags are truncated by the kernel
const TAG_BUFFER_SIZE: usize = 512;

/// Receives descriptors on the ingestion socket
pub struct FdReceiver {
    /// Bound datagram socket
    socket: UnixDatagram,
    /// Where readers send their entries
    engine: EngineHandle,
    /// Maximum line length for spawned readers
    max_line_len: usize,
}

impl FdReceiver {
    /// Create a receiver on an already bound socket
    pub fn new(socket: UnixDatagram, engine: EngineHandle) -> Self {
        Self {
            socket,
            engine,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    /// Set the maximum line length for readers
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// Receive registrations until cancelled
    ///
    /// Receive errors and bad registrations are logged and skipped.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut buf = [0u8; TAG_BUFFER_SIZE];
        info!("log socket receiving");

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.recv(&mut buf) => received,
            };

            match received {
                Ok(message) => {
                    let tag = String::from_utf8_lossy(&buf[..message.len]).into_owned();
                    self.register(tag, message).await;
                }
                Err(e) => {
                    warn!(error = %e, "failed to receive on log socket");
                    self.engine
                        .log_internal(format!("ERROR: unable to receive on log socket: {e}"))
                        .await;
                }
            }
        }

        debug!("log socket closed");
        Ok(())
    }

    /// Start the receiver in a background task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(cancel))
    }

    async fn recv(&self, buf: &mut [u8]) -> std::io::Result<ReceivedMessage> {
        self.socket
            .async_io(Interest::READABLE, || recv_with_fds(self.socket.as_fd(), &mut *buf))
            .await
    }

    /// Start a reader per descriptor, or close them all if the message is bad
    async fn register(&self, tag: String, message: ReceivedMessage) {
        if message.malformed {
            warn!(tag = %tag, fds = message.fds.len(), "malformed ancillary data");
            self.engine
                .log_internal(format!(
                    "ERROR: malformed ancillary data from {}, dropped {} descriptors",
                    tag.escape_debug(),
                    message.fds.len()
                ))
                .await;
            return;
        }

        if message.fds.is_empty() {
            debug!(tag = %tag, "ignoring log registration without descriptors");
            return;
        }

        if let Err(LogdError::InvalidSource { reason, .. }) = validate_source(&tag) {
            warn!(tag = %tag, reason, "rejected log registration");
            self.engine
                .log_internal(format!("ERROR: cannot register log {}: {reason}", tag.escape_debug()))
                .await;
            return;
        }

        let source: Arc<str> = Arc::from(tag);
        for fd in message.fds {
            let reader =
                LineReader::from_fd(fd, Arc::clone(&source), self.max_line_len, self.engine.clone());
            match reader {
                Ok(reader) => {
                    reader.spawn();
                    debug!(source = %source, "log stream registered");
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "cannot read log descriptor");
                    self.engine
                        .log_internal(format!(
                            "ERROR: cannot register log {}: {e}",
                            source.escape_debug()
                        ))
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "receiver_test.rs"]
mod tests;
