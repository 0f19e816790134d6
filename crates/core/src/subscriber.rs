//! Subscriber management for query connections
//!
//! Each query connection gets a `Subscription` that tracks:
//! - Unique ID for the connection
//! - Delivery mode (dump, follow, or both)
//! - Bounded channel sender feeding its writer task
//!
//! The `SubscriberRegistry` holds the following subscriptions and performs
//! fan-out. It lives inside the engine loop and is never shared, so it needs
//! no lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::entry::LogEntry;
use crate::protocol::LogMode;

/// Counter for generating unique subscriber IDs
static SUBSCRIBER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Outcome of a non-blocking push into a subscriber queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Entry queued for the writer
    Delivered,
    /// Queue full, entry dropped for this subscriber
    Dropped,
    /// Writer is gone (connection closed or errored)
    Closed,
}

/// A single query subscriber
#[derive(Debug)]
pub struct Subscription {
    /// Unique identifier
    id: u64,
    /// Requested delivery mode
    mode: LogMode,
    /// Channel sender for entry delivery
    sender: mpsc::Sender<Arc<LogEntry>>,
}

impl Subscription {
    /// Create a subscription and the receiving half of its queue
    ///
    /// `capacity` is raised to one if zero.
    pub fn new(mode: LogMode, capacity: usize) -> (Self, mpsc::Receiver<Arc<LogEntry>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let subscription = Self {
            id: SUBSCRIBER_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            mode,
            sender,
        };
        (subscription, receiver)
    }

    /// Get the subscriber ID
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the delivery mode
    #[inline]
    pub fn mode(&self) -> LogMode {
        self.mode
    }

    /// Try to queue an entry without waiting
    #[inline]
    pub fn try_send(&self, entry: Arc<LogEntry>) -> Delivery {
        match self.sender.try_send(entry) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Result of broadcasting one entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Broadcast {
    /// Subscribers that queued the entry
    pub delivered: usize,
    /// Subscribers whose queue was full
    pub dropped: usize,
    /// Errored subscribers removed from the registry
    pub reaped: usize,
}

/// Follow-mode subscribers
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    /// Active subscriptions, in registration order
    subscribers: Vec<Subscription>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription for future entries
    pub fn register(&mut self, subscription: Subscription) {
        self.subscribers.push(subscription);
    }

    /// Get number of registered subscribers
    pub fn count(&self) -> usize {
        self.subscribers.len()
    }

    /// Check if there are any subscribers
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Push an entry to every live subscriber without blocking
    ///
    /// Subscribers whose writer has gone are removed on the way.
    pub fn broadcast(&mut self, entry: &Arc<LogEntry>) -> Broadcast {
        let mut result = Broadcast::default();

        self.subscribers.retain(|subscriber| {
            match subscriber.try_send(Arc::clone(entry)) {
                Delivery::Delivered => result.delivered += 1,
                Delivery::Dropped => result.dropped += 1,
                Delivery::Closed => {
                    debug!(
                        subscriber_id = subscriber.id(),
                        mode = %subscriber.mode(),
                        "removing closed subscriber"
                    );
                    result.reaped += 1;
                    return false;
                }
            }
            true
        });

        result
    }
}

#[cfg(test)]
#[path = "subscriber_test.rs"]
mod tests;
