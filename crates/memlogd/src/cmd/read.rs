//! Read command - Print lines stored in a running daemon
//!
//! # Usage
//!
//! ```bash
//! memlogd read                     # dump the ring and exit
//! memlogd read --follow            # new lines only
//! memlogd read --dump-follow       # dump, then new lines
//! memlogd read -s web -s db        # only these sources
//! ```

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use memlogd_core::{DEFAULT_QUERY_SOCKET_PATH, LogLine, LogMode, QueryClient};

/// Read command arguments
#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Socket to query logs
    #[arg(long, value_name = "PATH", default_value = DEFAULT_QUERY_SOCKET_PATH)]
    socket_query: PathBuf,

    /// Print new lines as they arrive, skipping stored ones
    #[arg(short, long, conflicts_with = "dump_follow")]
    follow: bool,

    /// Print stored lines, then new lines as they arrive
    #[arg(short = 'F', long)]
    dump_follow: bool,

    /// Only print lines from this source (repeatable)
    #[arg(short, long, value_name = "TAG")]
    source: Vec<String>,
}

impl ReadArgs {
    fn mode(&self) -> LogMode {
        match (self.follow, self.dump_follow) {
            (true, _) => LogMode::Follow,
            (_, true) => LogMode::DumpFollow,
            _ => LogMode::Dump,
        }
    }
}

/// Run the read command
pub async fn run(args: ReadArgs) -> Result<()> {
    let mode = args.mode();
    let mut client = QueryClient::connect(&args.socket_query, mode)
        .await
        .with_context(|| format!("failed to connect to {}", args.socket_query.display()))?;
    debug!(%mode, socket = %args.socket_query.display(), "connected");

    let mut stdout = io::stdout().lock();
    while let Some(line) = client.next_line().await.context("failed to read from memlogd")? {
        if !matches_source(line, &args.source) {
            continue;
        }

        let written = writeln!(stdout, "{line}").and_then(|()| {
            if mode.follows() {
                stdout.flush()
            } else {
                Ok(())
            }
        });
        match written {
            Ok(()) => {}
            // Reader went away, e.g. piped into `head`
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(e).context("failed to write to stdout"),
        }
    }

    stdout.flush().or_else(ignore_broken_pipe)?;
    Ok(())
}

fn ignore_broken_pipe(e: io::Error) -> Result<()> {
    if e.kind() == io::ErrorKind::BrokenPipe {
        Ok(())
    } else {
        Err(e).context("failed to write to stdout")
    }
}

/// Whether `line` passes the source filter; unparsable lines always pass
fn matches_source(line: &str, sources: &[String]) -> bool {
    if sources.is_empty() {
        return true;
    }
    match LogLine::parse(line) {
        Ok(parsed) => sources.iter().any(|s| *s == parsed.source),
        Err(_) => true,
    }
}
