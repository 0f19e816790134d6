//! memlogd - in-memory log daemon
//!
//! # Usage
//!
//! ```bash
//! # Run the daemon (default)
//! memlogd
//! memlogd --socket-log /run/log.sock --socket-query /run/logq.sock --max-lines 10000
//!
//! # Read stored lines from a running daemon
//! memlogd read
//! memlogd read --follow --source web
//!
//! # Log a command's output
//! memlogd send --tag backup -- /usr/bin/backup --nightly
//! ```

mod cmd;

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memlogd_config::{LogConfig, LogFormat, LogOutput};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// memlogd - in-memory log daemon
#[derive(Parser, Debug)]
#[command(name = "memlogd")]
#[command(version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    // Daemon args when no subcommand is given
    #[command(flatten)]
    serve: cmd::serve::ServeArgs,

    /// Log filter (a level or `EnvFilter` directives). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon
    Serve(cmd::serve::ServeArgs),

    /// Read lines from a running daemon
    Read(cmd::read::ReadArgs),

    /// Send stdin or a command's output to a running daemon
    Send(cmd::send::SendArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve(cli.serve)) {
        Command::Serve(args) => {
            let config = cmd::serve::load_config(&args)?;
            init_logging(&config.log, cli.log_level.as_deref())?;
            cmd::serve::run(config).await
        }
        Command::Read(args) => {
            init_logging(&LogConfig::default(), cli.log_level.as_deref())?;
            cmd::read::run(args).await
        }
        Command::Send(args) => {
            init_logging(&LogConfig::default(), cli.log_level.as_deref())?;
            cmd::send::run(args).await
        }
    }
}

/// Initialize the tracing subscriber for logging
///
/// Level: CLI flag > config file > info. Accepts `EnvFilter` directives.
fn init_logging(config: &LogConfig, level_override: Option<&str>) -> Result<()> {
    let level = level_override.unwrap_or(config.level.as_str());
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let writer = match &config.output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    };

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Console => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    };

    tracing_subscriber::registry().with(layer).with(filter).init();

    Ok(())
}
