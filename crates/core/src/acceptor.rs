//! Query socket - accepts clients and reads their mode byte
//!
//! Mode bytes are read one connection at a time in the accept loop; once a
//! mode is known the connection is handed to the engine and everything after
//! that runs concurrently.

use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::EngineHandle;
use crate::error::{LogdError, Result};
use crate::protocol::LogMode;

/// Accepts query connections
pub struct QueryAcceptor {
    /// Bound stream listener
    listener: UnixListener,
    /// Engine receiving the subscriptions
    engine: EngineHandle,
}

impl QueryAcceptor {
    /// Create an acceptor on an already bound listener
    pub fn new(listener: UnixListener, engine: EngineHandle) -> Self {
        Self { listener, engine }
    }

    /// Accept connections until cancelled or the engine stops
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!("query socket accepting");

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let mut stream = match accepted {
                Ok((stream, _addr)) => stream,
                Err(e) => {
                    error!(error = %e, "failed to accept query connection");
                    continue;
                }
            };

            let mode = match read_mode(&mut stream).await {
                Ok(mode) => mode,
                Err(e) => {
                    warn!(error = %e, "abandoning query connection");
                    self.engine.log_internal(format!("ERROR: {e}")).await;
                    continue;
                }
            };

            debug!(%mode, "query connection accepted");
            if self.engine.query(stream, mode).await.is_err() {
                break;
            }
        }

        debug!("query socket closed");
        Ok(())
    }

    /// Start the acceptor in a background task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(cancel))
    }
}

/// Read the single mode byte a client sends after connecting
async fn read_mode(stream: &mut UnixStream) -> Result<LogMode> {
    let mut byte = [0u8; 1];
    match stream.read(&mut byte).await? {
        0 => Err(LogdError::Protocol("no query mode received".into())),
        _ => LogMode::from_byte(byte[0]),
    }
}

#[cfg(test)]
#[path = "acceptor_test.rs"]
mod tests;
