//! Serve command - Run the log daemon

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use memlogd_config::{Config, DaemonConfig};
use memlogd_core::{EngineConfig, MemlogServer, ServerConfig, SocketSource};

/// Serve command arguments
///
/// Flag names match the classic memlogd flags so existing init scripts keep
/// working.
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Socket to query logs
    #[arg(long, value_name = "PATH")]
    pub socket_query: Option<PathBuf>,

    /// Socket to receive log descriptors on
    #[arg(long, value_name = "PATH")]
    pub socket_log: Option<PathBuf>,

    /// Inherited socket to receive log descriptors on; negative means none
    #[arg(long, value_name = "FD", allow_negative_numbers = true)]
    pub fd_log: Option<i32>,

    /// Inherited socket to query logs on; negative means none
    #[arg(long, value_name = "FD", allow_negative_numbers = true)]
    pub fd_query: Option<i32>,

    /// Number of log lines to keep in memory
    #[arg(long, value_name = "N")]
    pub max_lines: Option<usize>,

    /// Maximum line length recorded; longer lines are truncated
    #[arg(long, value_name = "BYTES")]
    pub max_line_len: Option<usize>,

    /// Per-client queue size (defaults to --max-lines)
    #[arg(long, value_name = "N")]
    pub output_buffer: Option<usize>,

    /// Do not copy stored lines to stdout
    #[arg(long)]
    pub no_echo: bool,
}

impl ServeArgs {
    /// Apply command-line overrides on top of the file configuration
    fn apply(&self, daemon: &mut DaemonConfig) {
        if let Some(path) = &self.socket_query {
            daemon.socket_query = path.clone();
        }
        if let Some(path) = &self.socket_log {
            daemon.socket_log = path.clone();
        }
        if let Some(fd) = self.fd_log {
            daemon.fd_log = (fd >= 0).then_some(fd);
        }
        if let Some(fd) = self.fd_query {
            daemon.fd_query = (fd >= 0).then_some(fd);
        }
        if let Some(n) = self.max_lines {
            daemon.max_lines = n;
        }
        if let Some(n) = self.max_line_len {
            daemon.max_line_len = n;
        }
        if let Some(n) = self.output_buffer {
            daemon.output_buffer = Some(n);
        }
        if self.no_echo {
            daemon.echo = false;
        }
    }
}

/// Load the configuration file (if any) and apply flag overrides
pub fn load_config(args: &ServeArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path).context("failed to load configuration")?,
        None => Config::default(),
    };

    args.apply(&mut config.memlogd);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Build the server configuration from the daemon section
pub fn server_config(daemon: &DaemonConfig) -> ServerConfig {
    let socket = |fd: Option<i32>, path: &PathBuf| match fd {
        Some(fd) => SocketSource::Fd(fd),
        None => SocketSource::Path(path.clone()),
    };

    ServerConfig {
        log_socket: socket(daemon.fd_log, &daemon.socket_log),
        query_socket: socket(daemon.fd_query, &daemon.socket_query),
        engine: EngineConfig {
            ring_capacity: daemon.max_lines,
            output_buffer: daemon.output_buffer(),
            ingress_queue: daemon.ingress_queue,
        },
        max_line_len: daemon.max_line_len,
        echo: daemon.echo,
    }
}

/// Run the serve command
pub async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "memlogd starting"
    );

    let server = MemlogServer::bind(server_config(&config.memlogd))
        .context("failed to set up memlogd sockets")?;

    let cancel = CancellationToken::new();
    let server_task = server.spawn(cancel.clone());

    let signal_result = wait_for_shutdown().await;
    info!("shutdown signal received, stopping memlogd...");
    cancel.cancel();

    match server_task.await {
        Ok(Ok(stats)) => info!(
            received = stats.entries_received,
            delivered = stats.entries_delivered,
            dropped = stats.entries_dropped,
            subscriptions = stats.subscriptions_opened,
            "memlogd shutdown complete"
        ),
        Ok(Err(e)) => {
            error!(error = %e, "server error");
            return Err(e.into());
        }
        Err(e) => return Err(anyhow::anyhow!("server task panicked: {e}")),
    }

    signal_result
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown() -> Result<()> {
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    tokio::select! {
        result = signal::ctrl_c() => result.context("failed to listen for Ctrl+C")?,
        _ = terminate.recv() => {}
    }

    Ok(())
}
