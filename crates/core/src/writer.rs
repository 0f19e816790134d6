//! Per-connection writer task
//!
//! A `SubscriptionWriter` drains one subscription's queue and writes each
//! entry to the client as a text line. Entries already waiting in the queue
//! are coalesced into a single write.
//!
//! The writer stops when:
//! - the queue is closed and drained (dump finished, or engine shut down), in
//!   which case the connection is shut down cleanly
//! - a write fails, in which case the queue is closed so the engine reaps the
//!   subscription on its next entry
//!
//! An `EchoWriter` does the same for the operator copy on stdout, from its own
//! thread, since stdout writes block.

use std::io::{self, Write};
use std::sync::Arc;
use std::thread;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::entry::LogEntry;
use crate::error::Result;
use crate::protocol::LogMode;

/// Initial capacity of the line buffer
const WRITE_BUFFER_SIZE: usize = 16 * 1024;

/// Maximum entries coalesced into one write
const MAX_BATCH: usize = 256;

/// Drains a subscription queue into a connection
pub struct SubscriptionWriter<W> {
    /// Subscriber this writer serves
    id: u64,
    /// Delivery mode, for logging
    mode: LogMode,
    /// Client connection
    stream: W,
    /// Receiving half of the subscription queue
    receiver: mpsc::Receiver<Arc<LogEntry>>,
}

impl<W> SubscriptionWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Create a writer for a subscription
    pub fn new(
        id: u64,
        mode: LogMode,
        stream: W,
        receiver: mpsc::Receiver<Arc<LogEntry>>,
    ) -> Self {
        Self {
            id,
            mode,
            stream,
            receiver,
        }
    }

    /// Drain the queue until it closes or the connection fails
    ///
    /// Returns the number of entries written.
    pub async fn run(mut self) -> Result<u64> {
        let mut buf = BytesMut::with_capacity(WRITE_BUFFER_SIZE);
        let mut written = 0u64;

        while let Some(entry) = self.receiver.recv().await {
            entry.encode_into(&mut buf);
            let mut batched = 1;
            while batched < MAX_BATCH {
                match self.receiver.try_recv() {
                    Ok(entry) => {
                        entry.encode_into(&mut buf);
                        batched += 1;
                    }
                    Err(_) => break,
                }
            }

            if let Err(e) = self.stream.write_all(&buf).await {
                // Marks the subscription errored for the engine
                self.receiver.close();
                return Err(e.into());
            }
            buf.clear();
            written += batched as u64;
        }

        self.stream.shutdown().await?;
        Ok(written)
    }

    /// Run the writer in a background task
    pub fn spawn(self) -> JoinHandle<()> {
        let id = self.id;
        let mode = self.mode;

        tokio::spawn(async move {
            match self.run().await {
                Ok(written) => debug!(subscriber_id = id, %mode, written, "query finished"),
                Err(e) => debug!(subscriber_id = id, %mode, error = %e, "query connection closed"),
            }
        })
    }
}

/// Copies entries to a blocking sink from a dedicated thread
///
/// The queue is bounded and filled with `try_send`, so a sink that stops
/// draining (stdout piped to a stalled reader) only loses echo lines. The
/// thread exits once the writer is dropped and the queue is drained.
#[derive(Debug)]
pub struct EchoWriter {
    sender: mpsc::Sender<Arc<LogEntry>>,
}

impl EchoWriter {
    /// Start the echo thread writing to `sink`
    pub fn spawn(sink: impl Write + Send + 'static, capacity: usize) -> io::Result<Self> {
        let (sender, mut receiver) = mpsc::channel::<Arc<LogEntry>>(capacity.max(1));
        let mut sink = sink;

        thread::Builder::new()
            .name("memlogd-echo".into())
            .spawn(move || {
                while let Some(entry) = receiver.blocking_recv() {
                    // Best effort: a closed stdout must not stop the daemon
                    let _ = writeln!(sink, "{entry}");
                }
                let _ = sink.flush();
            })?;

        Ok(Self { sender })
    }

    /// Queue an entry for the sink; returns `false` if it was dropped
    #[inline]
    pub fn try_send(&self, entry: &Arc<LogEntry>) -> bool {
        self.sender.try_send(Arc::clone(entry)).is_ok()
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod tests;
