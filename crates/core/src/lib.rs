//! memlogd core - in-memory log aggregation for Unix systems
//!
//! Producers hand open descriptors to the daemon over a datagram socket. Each
//! line read from them is stamped, tagged with the producer's source name and
//! kept in a fixed-size ring. Clients on a stream socket can dump the ring,
//! follow new lines, or both.
//!
//! **Note:** This crate only compiles on Unix platforms (Linux, macOS) as it
//! relies on descriptor passing over Unix domain sockets.
//!
//! # Architecture
//!
//! ```text
//! producer ──SCM_RIGHTS──→ FdReceiver
//!                              │ one task per descriptor,
//!                              ▼ driven by the reactor
//!                          LineReader ──→ entries ──┐
//!                                                   ▼
//!                                                 Engine ──→ RingBuffer
//!                                                   ▲    └─→ echo thread → stdout
//! client ──mode byte──→ QueryAcceptor ──→ queries ──┘
//!                                                   │ bounded queue per client
//!                                                   ▼
//! client ◄──────────────────────────────── SubscriptionWriter
//! ```

#[cfg(unix)]
pub mod acceptor;
#[cfg(unix)]
pub mod buffer;
#[cfg(unix)]
pub mod client;
#[cfg(unix)]
pub mod engine;
#[cfg(unix)]
pub mod entry;
#[cfg(unix)]
mod error;
#[cfg(unix)]
pub mod protocol;
#[cfg(unix)]
pub mod reader;
#[cfg(unix)]
pub mod receiver;
#[cfg(unix)]
pub mod scm;
#[cfg(unix)]
pub mod server;
#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub mod subscriber;
#[cfg(unix)]
pub mod writer;

#[cfg(unix)]
pub use acceptor::QueryAcceptor;
#[cfg(unix)]
pub use buffer::RingBuffer;
#[cfg(unix)]
pub use client::{QueryClient, open_log_stream, register_fds};
#[cfg(unix)]
pub use engine::{
    DEFAULT_INGRESS_QUEUE, DEFAULT_RING_CAPACITY, Engine, EngineConfig, EngineHandle, EngineStats,
};
#[cfg(unix)]
pub use entry::{INTERNAL_SOURCE, LogEntry};
#[cfg(unix)]
pub use error::{LogdError, Result};
#[cfg(unix)]
pub use protocol::{LogLine, LogMode};
#[cfg(unix)]
pub use reader::{DEFAULT_MAX_LINE_LEN, LineReader};
#[cfg(unix)]
pub use receiver::FdReceiver;
#[cfg(unix)]
pub use server::{
    DEFAULT_LOG_SOCKET_PATH, DEFAULT_QUERY_SOCKET_PATH, MemlogServer, ServerConfig, SocketSource,
};
#[cfg(unix)]
pub use stream::ProducerStream;
#[cfg(unix)]
pub use subscriber::{SubscriberRegistry, Subscription};
#[cfg(unix)]
pub use writer::SubscriptionWriter;
