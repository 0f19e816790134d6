//! Daemon wiring - sockets, engine and the tasks around it
//!
//! `MemlogServer` binds (or inherits) the ingestion and query sockets, starts
//! the engine, the descriptor receiver and the query acceptor, and tears them
//! down again when cancelled.

use std::fs;
use std::io;
use std::os::fd::{FromRawFd, RawFd};
use std::os::unix::net::{UnixDatagram as StdUnixDatagram, UnixListener as StdUnixListener};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::{UnixDatagram, UnixListener};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::acceptor::QueryAcceptor;
use crate::engine::{Engine, EngineConfig, EngineStats};
use crate::error::{LogdError, Result};
use crate::reader::DEFAULT_MAX_LINE_LEN;
use crate::receiver::FdReceiver;

/// Default ingestion socket path
pub const DEFAULT_LOG_SOCKET_PATH: &str = "/var/run/linuxkit-external-logging.sock";

/// Default query socket path
pub const DEFAULT_QUERY_SOCKET_PATH: &str = "/var/run/memlogdq.sock";

/// How long shutdown waits for each task
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a socket comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketSource {
    /// Bind a new socket at this path, replacing any stale file
    Path(PathBuf),
    /// Use a descriptor inherited from the parent process
    Fd(RawFd),
}

impl SocketSource {
    fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Fd(fd) => format!("fd {fd}"),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Ingestion socket (datagram)
    pub log_socket: SocketSource,
    /// Query socket (stream)
    pub query_socket: SocketSource,
    /// Engine sizing
    pub engine: EngineConfig,
    /// Maximum stored line length, in bytes
    pub max_line_len: usize,
    /// Copy every entry to stdout
    pub echo: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_socket: SocketSource::Path(PathBuf::from(DEFAULT_LOG_SOCKET_PATH)),
            query_socket: SocketSource::Path(PathBuf::from(DEFAULT_QUERY_SOCKET_PATH)),
            engine: EngineConfig::default(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            echo: true,
        }
    }
}

impl ServerConfig {
    /// Bind the ingestion socket at a custom path
    pub fn with_log_socket_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.log_socket = SocketSource::Path(path.as_ref().to_path_buf());
        self
    }

    /// Bind the query socket at a custom path
    pub fn with_query_socket_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.query_socket = SocketSource::Path(path.as_ref().to_path_buf());
        self
    }

    /// Set engine sizing
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Set the maximum stored line length
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// Enable or disable the stdout echo
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.engine.ring_capacity == 0 {
            return Err(LogdError::InvalidConfig("ring capacity must be at least 1".into()));
        }
        if self.engine.output_buffer == 0 {
            return Err(LogdError::InvalidConfig("output buffer must be at least 1".into()));
        }
        if self.max_line_len == 0 {
            return Err(LogdError::InvalidConfig("max line length must be at least 1".into()));
        }
        Ok(())
    }
}

/// Socket file removed when the server goes away
#[derive(Debug)]
struct BoundPath(PathBuf);

impl Drop for BoundPath {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

/// The log daemon
pub struct MemlogServer {
    config: ServerConfig,
    log_socket: UnixDatagram,
    query_listener: UnixListener,
    bound: Vec<BoundPath>,
}

impl MemlogServer {
    /// Bind both sockets
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let mut bound = Vec::new();

        let log_socket = match &config.log_socket {
            SocketSource::Path(path) => {
                remove_stale(path)?;
                let socket = UnixDatagram::bind(path)?;
                bound.push(BoundPath(path.clone()));
                socket
            }
            SocketSource::Fd(fd) => {
                let fd = check_fd(*fd)?;
                // SAFETY: the descriptor was handed to this process for our
                // exclusive use and nothing else in the process owns it
                let socket = unsafe { StdUnixDatagram::from_raw_fd(fd) };
                socket.set_nonblocking(true)?;
                UnixDatagram::from_std(socket)?
            }
        };

        let query_listener = match &config.query_socket {
            SocketSource::Path(path) => {
                remove_stale(path)?;
                let listener = UnixListener::bind(path)?;
                bound.push(BoundPath(path.clone()));
                listener
            }
            SocketSource::Fd(fd) => {
                let fd = check_fd(*fd)?;
                // SAFETY: as above
                let listener = unsafe { StdUnixListener::from_raw_fd(fd) };
                listener.set_nonblocking(true)?;
                UnixListener::from_std(listener)?
            }
        };

        Ok(Self {
            config,
            log_socket,
            query_listener,
            bound,
        })
    }

    /// Run until `cancel` fires
    ///
    /// Socket files bound by path are removed on return.
    pub async fn run(self, cancel: CancellationToken) -> Result<EngineStats> {
        let Self {
            config,
            log_socket,
            query_listener,
            bound,
        } = self;

        let (engine, handle) = Engine::new(config.engine.clone());
        let engine = if config.echo {
            engine.with_echo(io::stdout())
        } else {
            engine
        };

        let engine_task = engine.spawn(cancel.clone());
        let receiver_task = FdReceiver::new(log_socket, handle.clone())
            .with_max_line_len(config.max_line_len)
            .spawn(cancel.clone());
        let acceptor_task = QueryAcceptor::new(query_listener, handle.clone()).spawn(cancel.clone());

        info!(
            log_socket = %config.log_socket.describe(),
            query_socket = %config.query_socket.describe(),
            max_lines = config.engine.ring_capacity,
            max_line_len = config.max_line_len,
            "memlogd started"
        );
        handle.log_internal("memlogd started").await;
        drop(handle);

        cancel.cancelled().await;
        info!("memlogd shutting down");

        join_task("log socket", receiver_task).await;
        join_task("query socket", acceptor_task).await;

        let stats = match tokio::time::timeout(SHUTDOWN_TIMEOUT, engine_task).await {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => {
                warn!(error = %e, "log engine panicked");
                EngineStats::default()
            }
            Err(_) => {
                warn!("log engine did not stop within timeout");
                EngineStats::default()
            }
        };

        drop(bound);
        Ok(stats)
    }

    /// Start the server in a background task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<EngineStats>> {
        tokio::spawn(self.run(cancel))
    }
}

async fn join_task(name: &str, task: JoinHandle<Result<()>>) {
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(task = name, error = %e, "task failed"),
        Ok(Err(e)) => warn!(task = name, error = %e, "task panicked"),
        Err(_) => warn!(task = name, "task did not stop within timeout"),
    }
}

/// Remove a socket file left behind by an earlier run
fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn check_fd(fd: RawFd) -> Result<RawFd> {
    if fd < 0 {
        return Err(LogdError::InvalidConfig(format!("invalid socket descriptor {fd}")));
    }
    Ok(fd)
}

#[cfg(test)]
#[path = "server_test.rs"]
mod tests;
