//! Socket abstraction and the external TLS collaborator trait (spec §6,
//! §9 "Socket I/O method selection"). The engine never cares whether it's
//! talking to a plain TCP socket or a TLS-wrapped one — both are captured
//! behind the same `Socket` trait object, the uniform read/write seam the
//! design note calls for.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};

/// Anything the engine can read from, write to, and poll for readiness.
/// Implemented for a plain `TcpStream` and for whatever a `TlsContext`
/// wraps it into.
pub trait Socket: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn raw_fd(&self) -> RawFd;
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
    fn shutdown(&mut self);
}

impl Socket for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn raw_fd(&self) -> RawFd {
        self.as_raw_fd()
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }

    fn shutdown(&mut self) {
        let _ = TcpStream::shutdown(self, std::net::Shutdown::Both);
    }
}

/// External collaborator (spec §6 "TLS integration"): the caller supplies
/// an opaque context capable of wrapping a freshly-accepted or
/// freshly-connected plain socket into a TLS one. The handshake itself is
/// blocking; the engine switches the resulting socket to non-blocking
/// immediately afterward.
pub trait TlsContext: Send + Sync {
    fn wrap_socket(
        &self,
        stream: TcpStream,
        server_side: bool,
        server_hostname: Option<&str>,
    ) -> io::Result<Box<dyn Socket>>;
}

/// Does `err` represent "no progress this turn" (`EAGAIN`/`EWOULDBLOCK`/
/// `EINTR`) rather than a real failure (spec §4.10/§7)?
pub fn would_block(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Poll a set of raw fds for read/write readiness — the convenience
/// readiness primitive backing `Server::wait`/`Client::wait` (spec §6
/// "Readiness primitive (external collaborator)"; the engine otherwise
/// never calls this directly, callers may drive their own loop off
/// `read_sockets()`/`write_sockets()` instead).
pub fn poll_ready(
    read_fds: &[RawFd],
    write_fds: &[RawFd],
    timeout: std::time::Duration,
) -> io::Result<(Vec<RawFd>, Vec<RawFd>)> {
    use std::collections::HashMap;

    let mut index: HashMap<RawFd, usize> = HashMap::new();
    let mut pfds: Vec<libc::pollfd> = Vec::new();
    for &fd in read_fds {
        let events = libc::POLLIN;
        match index.get(&fd) {
            Some(&i) => pfds[i].events |= events,
            None => {
                index.insert(fd, pfds.len());
                pfds.push(libc::pollfd {
                    fd,
                    events,
                    revents: 0,
                });
            }
        }
    }
    for &fd in write_fds {
        let events = libc::POLLOUT;
        match index.get(&fd) {
            Some(&i) => pfds[i].events |= events,
            None => {
                index.insert(fd, pfds.len());
                pfds.push(libc::pollfd {
                    fd,
                    events,
                    revents: 0,
                });
            }
        }
    }

    if pfds.is_empty() {
        std::thread::sleep(timeout);
        return Ok((Vec::new(), Vec::new()));
    }

    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    let rc = unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if would_block(&err) {
            return Ok((Vec::new(), Vec::new()));
        }
        return Err(err);
    }

    let mut readable = Vec::new();
    let mut writable = Vec::new();
    for pfd in &pfds {
        if pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
            readable.push(pfd.fd);
        }
        if pfd.revents & libc::POLLOUT != 0 {
            writable.push(pfd.fd);
        }
    }
    Ok((readable, writable))
}
