//! Descriptor passing over Unix sockets (`SCM_RIGHTS`)
//!
//! Thin wrappers around `recvmsg(2)` / `sendmsg(2)`. Received descriptors are
//! returned as `OwnedFd`, so ownership moves to the caller and anything the
//! caller drops is closed.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

/// Maximum descriptors accepted in one message
pub const MAX_FDS: usize = 16;

#[cfg(target_os = "linux")]
const RECV_FLAGS: libc::c_int = libc::MSG_CMSG_CLOEXEC;
#[cfg(not(target_os = "linux"))]
const RECV_FLAGS: libc::c_int = 0;

/// One datagram read from an ingestion socket
#[derive(Debug)]
pub struct ReceivedMessage {
    /// Payload bytes written into the caller's buffer
    pub len: usize,
    /// Descriptors carried in the ancillary data
    pub fds: Vec<OwnedFd>,
    /// Ancillary data was truncated or contained something other than rights
    pub malformed: bool,
}

/// Control buffer with `cmsghdr` alignment
struct ControlBuffer {
    words: Vec<u64>,
    len: usize,
}

impl ControlBuffer {
    fn for_fds(count: usize) -> Self {
        // SAFETY: CMSG_SPACE only does arithmetic on its argument
        let len = unsafe { libc::CMSG_SPACE((count * mem::size_of::<RawFd>()) as u32) } as usize;
        Self {
            words: vec![0u64; len.div_ceil(mem::size_of::<u64>())],
            len,
        }
    }

    fn as_mut_ptr(&mut self) -> *mut libc::c_void {
        self.words.as_mut_ptr().cast()
    }
}

/// Receive one datagram and any descriptors attached to it
///
/// Returns `WouldBlock` on a non-blocking socket with nothing queued.
pub fn recv_with_fds(socket: BorrowedFd<'_>, buf: &mut [u8]) -> io::Result<ReceivedMessage> {
    let mut control = ControlBuffer::for_fds(MAX_FDS);
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };

    // SAFETY: msghdr is plain data; every pointer set below outlives the call
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr();
    msg.msg_controllen = control.len as _;

    // SAFETY: msg points at live buffers sized as declared
    let n = unsafe { libc::recvmsg(socket.as_raw_fd(), &mut msg, RECV_FLAGS) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut fds = Vec::new();
    let mut malformed = msg.msg_flags & libc::MSG_CTRUNC != 0;

    // SAFETY: the kernel filled msg_control with msg_controllen bytes of
    // well-formed cmsghdr records; CMSG_* walk exactly that region
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            let header = &*cmsg;
            if header.cmsg_level == libc::SOL_SOCKET && header.cmsg_type == libc::SCM_RIGHTS {
                let data = libc::CMSG_DATA(cmsg).cast::<RawFd>();
                let payload = header.cmsg_len as usize - libc::CMSG_LEN(0) as usize;
                for i in 0..payload / mem::size_of::<RawFd>() {
                    let fd = ptr::read_unaligned(data.add(i));
                    fds.push(OwnedFd::from_raw_fd(fd));
                }
            } else {
                malformed = true;
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    Ok(ReceivedMessage {
        len: n as usize,
        fds,
        malformed,
    })
}

/// Send `payload` with `fds` attached on a connected socket
pub fn send_with_fds(
    socket: BorrowedFd<'_>,
    payload: &[u8],
    fds: &[BorrowedFd<'_>],
) -> io::Result<usize> {
    if fds.is_empty() || fds.len() > MAX_FDS {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("expected 1..={MAX_FDS} descriptors, got {}", fds.len()),
        ));
    }
    send_rights(socket, payload, fds)
}

/// Send one `SCM_RIGHTS` message carrying every descriptor in `fds`
///
/// No limit is applied, so a receiver may see the control data truncated.
pub(crate) fn send_rights(
    socket: BorrowedFd<'_>,
    payload: &[u8],
    fds: &[BorrowedFd<'_>],
) -> io::Result<usize> {
    let mut control = ControlBuffer::for_fds(fds.len());
    let mut iov = libc::iovec {
        iov_base: payload.as_ptr() as *mut libc::c_void,
        iov_len: payload.len(),
    };

    // SAFETY: msghdr is plain data; every pointer set below outlives the call
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr();
    msg.msg_controllen = control.len as _;

    // SAFETY: the control buffer holds CMSG_SPACE(fds) bytes, enough for one
    // header plus the descriptor array written here
    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN((fds.len() * mem::size_of::<RawFd>()) as u32) as _;
        let data = libc::CMSG_DATA(cmsg).cast::<RawFd>();
        for (i, fd) in fds.iter().enumerate() {
            ptr::write_unaligned(data.add(i), fd.as_raw_fd());
        }
    }

    // SAFETY: msg points at live buffers sized as declared
    let n = unsafe { libc::sendmsg(socket.as_raw_fd(), &msg, 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

#[cfg(test)]
#[path = "scm_test.rs"]
mod tests;
