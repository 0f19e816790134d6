//! Engine - the single owner of the ring buffer and subscriber registry
//!
//! All mutation of shared log state happens in one task. Producers and the
//! query acceptor only talk to it through two channels:
//!
//! ```text
//! LineReader ──┐                          ┌──→ ring buffer
//! LineReader ──┼──→ entries ──┐           │
//!   ...        ┘              ├──→ Engine ┼──→ follow queues ──→ writers
//! QueryAcceptor ──→ queries ──┘           │
//!                                         └──→ stdout echo
//! ```
//!
//! The engine never waits on a subscriber: every push into a subscriber queue
//! is a `try_send`, and a full queue drops the entry for that subscriber only.
//!
//! Every message carries a sequence number taken from a counter shared by all
//! handles. Before a query is served, queued entries with a lower number are
//! appended first, and entries with a higher number wait until after it. A
//! caller that logs and then queries always sees its entry in the snapshot;
//! one that queries and then logs always sees it on the live tail.
//!
//! The snapshot and the registration of a `DumpFollow` subscriber happen in
//! the same step, so the seam between them has no gap and no duplicate.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::buffer::RingBuffer;
use crate::entry::LogEntry;
use crate::error::{LogdError, Result};
use crate::protocol::LogMode;
use crate::subscriber::{Delivery, SubscriberRegistry, Subscription};
use crate::writer::{EchoWriter, SubscriptionWriter};

/// Default ring capacity, in lines
pub const DEFAULT_RING_CAPACITY: usize = 5000;

/// Default depth of the ingress channel
pub const DEFAULT_INGRESS_QUEUE: usize = 1024;

/// Depth of the query hand-off channel
const QUERY_QUEUE: usize = 64;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of lines kept in the ring
    pub ring_capacity: usize,
    /// Per-subscriber queue capacity
    pub output_buffer: usize,
    /// Depth of the channel between readers and the engine
    pub ingress_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            output_buffer: DEFAULT_RING_CAPACITY,
            ingress_queue: DEFAULT_INGRESS_QUEUE,
        }
    }
}

impl EngineConfig {
    /// Create config with matching ring and output buffer capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring_capacity: capacity,
            output_buffer: capacity,
            ..Default::default()
        }
    }

    /// Set the per-subscriber queue capacity
    pub fn with_output_buffer(mut self, output_buffer: usize) -> Self {
        self.output_buffer = output_buffer;
        self
    }
}

/// A query connection handed to the engine
#[derive(Debug)]
pub struct QueryRequest {
    /// Client connection
    pub stream: UnixStream,
    /// Requested delivery mode
    pub mode: LogMode,
}

/// A message tagged with its hand-off order
#[derive(Debug)]
struct Sequenced<T> {
    seq: u64,
    item: T,
}

/// Cloneable handle for feeding the engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    /// Hand-off order shared by every clone
    sequence: Arc<AtomicU64>,
    /// Entries from readers and the daemon itself
    entries: mpsc::Sender<Sequenced<LogEntry>>,
    /// Query connections from the acceptor
    queries: mpsc::Sender<Sequenced<QueryRequest>>,
}

impl EngineHandle {
    #[inline]
    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Send an entry, waiting if the ingress channel is full
    pub async fn log(&self, entry: LogEntry) -> Result<()> {
        let seq = self.next_seq();
        self.entries
            .send(Sequenced { seq, item: entry })
            .await
            .map_err(|_| LogdError::EngineStopped)
    }

    /// Record a message from the daemon itself
    ///
    /// Dropped silently if the engine has stopped.
    pub async fn log_internal(&self, message: impl Into<String>) {
        let _ = self.log(LogEntry::internal(message)).await;
    }

    /// Hand a query connection to the engine
    pub async fn query(&self, stream: UnixStream, mode: LogMode) -> Result<()> {
        let seq = self.next_seq();
        self.queries
            .send(Sequenced {
                seq,
                item: QueryRequest { stream, mode },
            })
            .await
            .map_err(|_| LogdError::EngineStopped)
    }
}

/// Statistics about the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Entries appended to the ring
    pub entries_received: u64,
    /// Entries queued to subscribers (snapshot and live)
    pub entries_delivered: u64,
    /// Entries dropped because a subscriber queue was full
    pub entries_dropped: u64,
    /// Query connections accepted
    pub subscriptions_opened: u64,
    /// Follow subscribers removed after their writer went away
    pub subscriptions_reaped: u64,
    /// Entries not echoed because the echo queue was full
    pub echo_dropped: u64,
}

/// The ring buffer engine
pub struct Engine {
    /// Configuration
    config: EngineConfig,
    /// Most recent entries
    ring: RingBuffer<Arc<LogEntry>>,
    /// Follow and DumpFollow subscribers
    subscribers: SubscriberRegistry,
    /// Operator-visible copy of every entry
    echo: Option<EchoWriter>,
    /// Counters
    stats: EngineStats,
    /// Incoming entries
    entries: mpsc::Receiver<Sequenced<LogEntry>>,
    /// Entry received ahead of a query, appended next
    pending: Option<Sequenced<LogEntry>>,
    /// Incoming queries
    queries: mpsc::Receiver<Sequenced<QueryRequest>>,
}

impl Engine {
    /// Create an engine and the handle used to feed it
    pub fn new(config: EngineConfig) -> (Self, EngineHandle) {
        let (entry_tx, entry_rx) = mpsc::channel(config.ingress_queue.max(1));
        let (query_tx, query_rx) = mpsc::channel(QUERY_QUEUE);

        let engine = Self {
            ring: RingBuffer::with_capacity(config.ring_capacity),
            subscribers: SubscriberRegistry::new(),
            echo: None,
            stats: EngineStats::default(),
            entries: entry_rx,
            pending: None,
            queries: query_rx,
            config,
        };
        let handle = EngineHandle {
            sequence: Arc::new(AtomicU64::new(0)),
            entries: entry_tx,
            queries: query_tx,
        };

        (engine, handle)
    }

    /// Copy every entry to `sink` as it arrives
    ///
    /// The sink is written from its own thread through a queue of
    /// `output_buffer` entries. Entries that do not fit are not echoed, and
    /// write errors on the sink are ignored.
    pub fn with_echo(mut self, sink: impl Write + Send + 'static) -> Self {
        match EchoWriter::spawn(sink, self.config.output_buffer) {
            Ok(echo) => self.echo = Some(echo),
            Err(e) => warn!(error = %e, "failed to start echo thread, echo disabled"),
        }
        self
    }

    /// Run the engine loop
    ///
    /// Returns when `cancel` fires or every handle has been dropped.
    pub async fn run(mut self, cancel: CancellationToken) -> EngineStats {
        info!(
            ring_capacity = self.ring.capacity(),
            output_buffer = self.config.output_buffer,
            "log engine running"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(request) = self.queries.recv() => {
                    self.catch_up(request.seq);
                    self.on_query(request.item);
                }

                entry = next_entry(&mut self.pending, &mut self.entries) => match entry {
                    Some(entry) => self.on_entry(entry.item),
                    None => break,
                },
            }
        }

        info!(
            received = self.stats.entries_received,
            delivered = self.stats.entries_delivered,
            dropped = self.stats.entries_dropped,
            echo_dropped = self.stats.echo_dropped,
            subscriptions = self.stats.subscriptions_opened,
            "log engine stopped"
        );
        self.stats
    }

    /// Start the engine in a background task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<EngineStats> {
        tokio::spawn(self.run(cancel))
    }

    /// Append every queued entry handed off before `seq`
    fn catch_up(&mut self, seq: u64) {
        loop {
            let next = match self.pending.take() {
                Some(entry) => entry,
                None => match self.entries.try_recv() {
                    Ok(entry) => entry,
                    Err(_) => return,
                },
            };
            if next.seq > seq {
                self.pending = Some(next);
                return;
            }
            self.on_entry(next.item);
        }
    }

    /// Append an entry and fan it out to follow subscribers
    fn on_entry(&mut self, entry: LogEntry) {
        let entry = Arc::new(entry);
        if let Some(echo) = &self.echo
            && !echo.try_send(&entry)
        {
            self.stats.echo_dropped += 1;
        }

        self.ring.push(Arc::clone(&entry));
        self.stats.entries_received += 1;

        if self.subscribers.is_empty() {
            return;
        }

        let result = self.subscribers.broadcast(&entry);
        self.stats.entries_delivered += result.delivered as u64;
        self.stats.entries_dropped += result.dropped as u64;
        self.stats.subscriptions_reaped += result.reaped as u64;

        if result.dropped > 0 {
            trace!(dropped = result.dropped, "subscriber queues full");
        }
    }

    /// Open a subscription for a query connection
    fn on_query(&mut self, request: QueryRequest) {
        let QueryRequest { stream, mode } = request;
        let (subscription, receiver) = Subscription::new(mode, self.config.output_buffer);
        let id = subscription.id();
        self.stats.subscriptions_opened += 1;

        SubscriptionWriter::new(id, mode, stream, receiver).spawn();

        if mode.dumps() {
            // Newest entries win when the snapshot does not fit the queue
            let snapshot = self.ring.last_n(self.config.output_buffer);
            let mut delivered = 0u64;
            for entry in snapshot {
                if subscription.try_send(entry) == Delivery::Delivered {
                    delivered += 1;
                }
            }
            self.stats.entries_delivered += delivered;
            self.stats.entries_dropped += self.ring.len() as u64 - delivered;
            debug!(subscriber_id = id, %mode, entries = delivered, "snapshot queued");
        }

        if mode.follows() {
            self.subscribers.register(subscription);
            debug!(
                subscriber_id = id,
                %mode,
                subscribers = self.subscribers.count(),
                "subscriber registered"
            );
        }
        // A dump-only subscription is dropped here, closing its queue
    }
}

/// Next entry to append, preferring one held back by `catch_up`
async fn next_entry(
    pending: &mut Option<Sequenced<LogEntry>>,
    entries: &mut mpsc::Receiver<Sequenced<LogEntry>>,
) -> Option<Sequenced<LogEntry>> {
    match pending.take() {
        Some(entry) => Some(entry),
        None => entries.recv().await,
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
