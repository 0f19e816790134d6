//! Client helpers for the query and ingestion sockets

use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::{UnixDatagram as StdUnixDatagram, UnixStream as StdUnixStream};
use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::error::Result;
use crate::protocol::{LogLine, LogMode, validate_source};
use crate::scm::send_with_fds;

/// Client for reading from the query socket
pub struct QueryClient {
    reader: BufReader<UnixStream>,
    mode: LogMode,
    line: String,
}

impl QueryClient {
    /// Connect to the query socket and request `mode`
    pub async fn connect<P: AsRef<Path>>(path: P, mode: LogMode) -> Result<Self> {
        let mut stream = UnixStream::connect(path.as_ref()).await?;
        stream.write_all(&[mode.as_byte()]).await?;

        Ok(Self {
            reader: BufReader::new(stream),
            mode,
            line: String::new(),
        })
    }

    /// Requested mode
    pub fn mode(&self) -> LogMode {
        self.mode
    }

    /// Receive the next raw line, without its newline
    ///
    /// Returns `Ok(None)` once the server closes the connection.
    pub async fn next_line(&mut self) -> Result<Option<&str>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(self.line.trim_end_matches('\n')))
    }

    /// Receive and parse the next line
    pub async fn next_entry(&mut self) -> Result<Option<LogLine>> {
        match self.next_line().await? {
            Some(line) => LogLine::parse(line).map(Some),
            None => Ok(None),
        }
    }
}

/// Register descriptors with the daemon under `tag`
///
/// Every line later written to any of `fds` is stored with that tag. The
/// caller keeps its own copies of the descriptors.
pub fn register_fds(socket_path: &Path, tag: &str, fds: &[BorrowedFd<'_>]) -> Result<()> {
    validate_source(tag)?;

    let socket = StdUnixDatagram::unbound()?;
    socket.connect(socket_path)?;
    send_with_fds(socket.as_fd(), tag.as_bytes(), fds)?;
    Ok(())
}

/// Open a stream whose lines are stored under `tag`
///
/// A socket pair is created and its far end registered with the daemon. The
/// returned end is for writing only.
pub fn open_log_stream(socket_path: &Path, tag: &str) -> Result<StdUnixStream> {
    let (local, remote) = StdUnixStream::pair()?;
    register_fds(socket_path, tag, &[remote.as_fd()])?;
    local.shutdown(std::net::Shutdown::Read)?;
    Ok(local)
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
