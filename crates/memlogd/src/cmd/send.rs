//! Send command - Hand a stream to a running daemon
//!
//! Without a command, this process's stdin descriptor is registered and the
//! daemon keeps reading it after we exit. With a command, the command's
//! stdout and stderr are connected to a socket registered with the daemon.
//!
//! # Usage
//!
//! ```bash
//! some-service | memlogd send --tag some-service
//! memlogd send --tag backup -- /usr/bin/backup --nightly
//! ```

use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use clap::Args;
use tokio::process::Command;
use tracing::{debug, info};

use memlogd_core::{DEFAULT_LOG_SOCKET_PATH, open_log_stream, register_fds};

/// Send command arguments
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket to send log descriptors to
    #[arg(long, value_name = "PATH", default_value = DEFAULT_LOG_SOCKET_PATH)]
    socket_log: PathBuf,

    /// Source tag stored with every line
    #[arg(short, long)]
    tag: String,

    /// Command whose output is logged
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

/// Run the send command
pub async fn run(args: SendArgs) -> Result<()> {
    let Some((program, program_args)) = args.command.split_first() else {
        register_fds(&args.socket_log, &args.tag, &[io::stdin().as_fd()])
            .with_context(|| format!("failed to register stdin with {}", args.socket_log.display()))?;
        debug!(tag = %args.tag, "stdin registered");
        return Ok(());
    };

    let stream = open_log_stream(&args.socket_log, &args.tag)
        .with_context(|| format!("failed to register with {}", args.socket_log.display()))?;
    let stderr = OwnedFd::from(stream.try_clone().context("failed to duplicate log stream")?);
    let stdout = OwnedFd::from(stream);

    let mut child = Command::new(program)
        .args(program_args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    info!(tag = %args.tag, program = %program, pid = ?child.id(), "command started");

    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to wait for {program}"))?;
    if !status.success() {
        bail!("{program} exited with {status}");
    }
    Ok(())
}
