//! Raw `NETLINK_NETFILTER` socket plumbing: creation, batched send via
//! `sendmmsg`, batched receive via `recvmmsg`.
//!
//! `nix` 0.27 has no `NetlinkNetfilter` protocol variant and no safe
//! `sendmmsg`/`recvmmsg` wrapper, so this module reaches into `nix::libc`
//! directly for those three calls — the same escape hatch the socket
//! handling this was adapted from uses for raw `sockaddr_in`/`sockaddr_in6`
//! construction — and uses `nix`'s safe `bind`/`getsockname` for the rest.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use nix::libc;
use nix::sys::socket::{bind, getsockname, NetlinkAddr};

use crate::error::Error;

const NETLINK_NETFILTER: libc::c_int = 12;

/// Opens and binds a nonblocking `NETLINK_NETFILTER` socket, returning it
/// together with the port id the kernel assigned via autobind.
pub fn create_socket() -> Result<(OwnedFd, u32), Error> {
    let fd = unsafe { libc::socket(libc::AF_NETLINK, libc::SOCK_RAW | libc::SOCK_NONBLOCK, NETLINK_NETFILTER) };
    if fd < 0 {
        return Err(nix::errno::Errno::last().into());
    }
    let sock = unsafe { OwnedFd::from_raw_fd(fd) };

    let addr = NetlinkAddr::new(0, 0);
    bind(sock.as_raw_fd(), &addr)?;
    let bound: NetlinkAddr = getsockname(sock.as_raw_fd())?;
    Ok((sock, bound.pid()))
}

/// Sends each element of `messages` as one `sendmmsg` datagram. Each inner
/// slice is the scatter/gather list for one netlink message (a probe is a
/// single iovec, a new-dialect phase-2 insert is five).
///
/// Returns the number of datagrams the kernel accepted. A short count (less
/// than `messages.len()`) means the caller must inspect `errno` and decide
/// whether to retry the remainder; this function does not retry on its own.
pub fn send_batch(sock: &OwnedFd, messages: &[Vec<libc::iovec>]) -> Result<usize, Error> {
    if messages.is_empty() {
        return Ok(0);
    }
    let mut mmsgs: Vec<libc::mmsghdr> = messages
        .iter()
        .map(|iov| libc::mmsghdr {
            msg_hdr: libc::msghdr {
                msg_name: std::ptr::null_mut(),
                msg_namelen: 0,
                msg_iov: iov.as_ptr() as *mut libc::iovec,
                msg_iovlen: iov.len(),
                msg_control: std::ptr::null_mut(),
                msg_controllen: 0,
                msg_flags: 0,
            },
            msg_len: 0,
        })
        .collect();

    let sent = unsafe { libc::sendmmsg(sock.as_raw_fd(), mmsgs.as_mut_ptr(), mmsgs.len() as u32, 0) };
    if sent < 0 {
        return Err(nix::errno::Errno::last().into());
    }
    Ok(sent as usize)
}

/// Receives up to `bufs.len()` datagrams via a single nonblocking
/// `recvmmsg` call. Returns the received length of each datagram that
/// arrived; a shorter result than `bufs.len()` means no more replies were
/// immediately available (`EAGAIN`/`EWOULDBLOCK`, mapped to the partial
/// result rather than an error).
pub fn recv_batch(sock: &OwnedFd, bufs: &mut [&mut [u8]]) -> Result<Vec<usize>, Error> {
    if bufs.is_empty() {
        return Ok(Vec::new());
    }
    let mut iovecs: Vec<libc::iovec> = bufs
        .iter_mut()
        .map(|b| libc::iovec {
            iov_base: b.as_mut_ptr() as *mut libc::c_void,
            iov_len: b.len(),
        })
        .collect();
    let mut mmsgs: Vec<libc::mmsghdr> = iovecs
        .iter_mut()
        .map(|iov| libc::mmsghdr {
            msg_hdr: libc::msghdr {
                msg_name: std::ptr::null_mut(),
                msg_namelen: 0,
                msg_iov: iov as *mut libc::iovec,
                msg_iovlen: 1,
                msg_control: std::ptr::null_mut(),
                msg_controllen: 0,
                msg_flags: 0,
            },
            msg_len: 0,
        })
        .collect();

    let received = unsafe {
        libc::recvmmsg(
            sock.as_raw_fd(),
            mmsgs.as_mut_ptr(),
            mmsgs.len() as u32,
            libc::MSG_DONTWAIT,
            std::ptr::null_mut(),
        )
    };
    if received < 0 {
        let errno = nix::errno::Errno::last();
        if errno == nix::errno::Errno::EAGAIN {
            return Ok(Vec::new());
        }
        return Err(errno.into());
    }
    Ok(mmsgs[..received as usize].iter().map(|m| m.msg_len as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_batch_on_empty_input_is_a_noop() {
        // Socket creation needs CAP_NET_ADMIN-free netlink access, which is
        // always available, but binding a real kernel socket in unit tests
        // is avoided in favor of exercising the degenerate-input path only.
        let (sock, _port) = match create_socket() {
            Ok(v) => v,
            Err(_) => return, // sandboxed test environment without netlink
        };
        assert_eq!(send_batch(&sock, &[]).unwrap(), 0);
    }
}
