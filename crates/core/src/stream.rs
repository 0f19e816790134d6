//! Producer descriptors as async byte streams
//!
//! Pipes, sockets and terminals are switched to non-blocking mode and driven
//! by the reactor, so an idle producer holds no thread and never delays
//! runtime shutdown. Descriptors epoll refuses (regular files, `/dev/null`)
//! are read on the blocking pool instead; those always reach EOF.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, Interest, ReadBuf};

/// A received producer descriptor
#[derive(Debug)]
pub enum ProducerStream {
    /// Non-blocking descriptor registered with the reactor
    Polled(AsyncFd<File>),
    /// Pollable only through `spawn_blocking`
    Blocking(tokio::fs::File),
}

impl ProducerStream {
    /// Take ownership of `fd` and prepare it for async reads
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(fd.as_fd())?;

        match AsyncFd::try_with_interest(File::from(fd), Interest::READABLE) {
            Ok(polled) => Ok(Self::Polled(polled)),
            Err(e) => {
                let (file, error) = e.into_parts();
                if error.raw_os_error() == Some(libc::EPERM) {
                    Ok(Self::Blocking(tokio::fs::File::from_std(file)))
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Whether reads go through the reactor
    pub fn is_polled(&self) -> bool {
        matches!(self, Self::Polled(_))
    }
}

impl AsyncRead for ProducerStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Polled(fd) => poll_read_fd(fd, cx, buf),
            Self::Blocking(file) => Pin::new(file).poll_read(cx, buf),
        }
    }
}

fn poll_read_fd(
    fd: &AsyncFd<File>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
) -> Poll<io::Result<()>> {
    loop {
        let mut guard = ready!(fd.poll_read_ready(cx))?;

        let unfilled = buf.initialize_unfilled();
        match guard.try_io(|inner| {
            let mut file: &File = inner.get_ref();
            file.read(unfilled)
        }) {
            Ok(Ok(n)) => {
                buf.advance(n);
                return Poll::Ready(Ok(()));
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
            Ok(Err(e)) => return Poll::Ready(Err(e)),
            // Readiness was stale; wait for the next edge
            Err(_would_block) => continue,
        }
    }
}

/// Set `O_NONBLOCK` on the open file description behind `fd`
fn set_nonblocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    // SAFETY: F_GETFL only reads flags of a descriptor we hold a borrow of
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }

    // SAFETY: as above; F_SETFL only changes status flags
    if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod tests;
