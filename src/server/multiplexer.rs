//! The accept/readiness loop (spec §4.6). Generalizes the teacher's
//! epoll-driven `Worker::run` into the caller-driven contract spec §6
//! requires: `read_sockets()`/`write_sockets()`/`event_read()`/
//! `event_write()` for callers running their own `select`/`poll`, plus a
//! `wait()` convenience loop for everyone else. Live connections are kept
//! in a slab (`Vec<Option<Connection>>` + free-index stack), the same
//! indexing discipline the teacher's `slab.rs` uses, alongside an
//! insertion-order queue so eviction/idle-sweep order matches
//! `uhttp_server.py`'s `_waiting_connections` list semantics.

use crate::config::ServerConfig;
use crate::io::{Socket, TlsContext, poll_ready};
use crate::response::Response;
use crate::server::connection::{ConnEvent, Connection};
use std::collections::VecDeque;
use std::io;
use std::net::TcpListener;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

/// Opaque handle to a live connection, returned by `event_read`/`wait`
/// once its request has finished loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnId(usize);

pub struct Server {
    listener: TcpListener,
    ssl_context: Option<Arc<dyn TlsContext>>,
    config: ServerConfig,
    connections: Vec<Option<Connection>>,
    free: Vec<usize>,
    /// Insertion order of currently-live slots; drives oldest-first
    /// eviction and in-order sweeps.
    order: VecDeque<usize>,
}

impl Server {
    /// Bind the listening socket and switch it to non-blocking. Note:
    /// `std::net::TcpListener` exposes no backlog knob, so
    /// `config.listen_backlog` only documents intent here — the kernel
    /// default backlog is used.
    pub fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind((config.address.as_str(), config.port))?;
        listener.set_nonblocking(true)?;
        let ssl_context = config.ssl_context.clone();
        Ok(Server {
            listener,
            ssl_context,
            config,
            connections: Vec::new(),
            free: Vec::new(),
            order: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn connection(&self, id: ConnId) -> &Connection {
        self.connections[id.0].as_ref().expect("stale ConnId")
    }

    pub fn connection_mut(&mut self, id: ConnId) -> &mut Connection {
        self.connections[id.0].as_mut().expect("stale ConnId")
    }

    fn insert(&mut self, conn: Connection) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.connections[idx] = Some(conn);
                idx
            }
            None => {
                self.connections.push(Some(conn));
                self.connections.len() - 1
            }
        }
    }

    fn remove(&mut self, idx: usize) {
        if self.connections[idx].take().is_some() {
            self.free.push(idx);
            self.order.retain(|&i| i != idx);
        }
    }

    /// Readiness projection for an external `select`/`poll` loop: every
    /// live connection socket plus the listener.
    pub fn read_sockets(&self) -> Vec<RawFd> {
        let mut fds: Vec<RawFd> = self
            .order
            .iter()
            .filter_map(|&idx| self.connections[idx].as_ref().and_then(Connection::raw_fd))
            .collect();
        fds.push(self.listener.as_raw_fd());
        fds
    }

    /// Readiness projection: connections with buffered bytes or an active
    /// file stream.
    pub fn write_sockets(&self) -> Vec<RawFd> {
        self.order
            .iter()
            .filter_map(|&idx| {
                self.connections[idx]
                    .as_ref()
                    .filter(|c| c.has_data_to_send())
                    .and_then(Connection::raw_fd)
            })
            .collect()
    }

    fn accept(&mut self) {
        let (stream, addr) = match self.listener.accept() {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("accept failed: {e}");
                return;
            }
        };
        let _ = stream.set_nodelay(true);

        let socket: Box<dyn Socket> = match &self.ssl_context {
            Some(ctx) => match ctx.wrap_socket(stream, true, None) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("TLS handshake with {addr} failed: {e}");
                    return;
                }
            },
            None => Box::new(stream),
        };
        let _ = socket.set_nonblocking(true);

        while self.order.len() > self.config.max_waiting_clients {
            let Some(oldest) = self.order.pop_front() else { break };
            if let Some(c) = self.connections[oldest].as_mut() {
                tracing::debug!("evicting oldest waiting connection, max_waiting_clients exceeded");
                let _ = c.respond(Response::new(408).body("Request Timeout, too many requests"));
            }
            self.remove(oldest);
        }

        tracing::trace!("accepted connection from {addr}");
        let conn = Connection::new(socket, addr, &self.config);
        let idx = self.insert(conn);
        self.order.push_back(idx);
    }

    /// Process a read-ready set. If the listener is ready, accepts once
    /// and returns `None` (mirrors `uhttp_server.py`'s `event_read`: one
    /// accept per call). Otherwise advances the first ready connection
    /// that isn't already waiting for its response; the first one that
    /// reaches `LOADED` is returned.
    pub fn event_read(&mut self, ready: &[RawFd]) -> Option<ConnId> {
        if ready.contains(&self.listener.as_raw_fd()) {
            self.accept();
            return None;
        }
        let indices: Vec<usize> = self.order.iter().copied().collect();
        for idx in indices {
            let Some(conn) = self.connections[idx].as_mut() else { continue };
            if conn.is_closed() {
                self.remove(idx);
                continue;
            }
            let Some(fd) = conn.raw_fd() else { continue };
            if !ready.contains(&fd) {
                continue;
            }
            match conn.process_request() {
                Ok(true) => return Some(ConnId(idx)),
                Ok(false) => {}
                Err(_) => self.remove(idx),
            }
        }
        None
    }

    /// Process a write-ready set: flush each connection's send buffer,
    /// finalizing (reset or close) once it fully drains.
    pub fn event_write(&mut self, ready: &[RawFd]) {
        let indices: Vec<usize> = self.order.iter().copied().collect();
        for idx in indices {
            let Some(conn) = self.connections[idx].as_mut() else { continue };
            if conn.is_closed() {
                self.remove(idx);
                continue;
            }
            let Some(fd) = conn.raw_fd() else { continue };
            if !ready.contains(&fd) {
                continue;
            }
            if conn.try_send() {
                conn.finalize_sent_response();
            }
            if conn.is_closed() {
                self.remove(idx);
            }
        }
    }

    /// Event-mode counterpart of `event_read` (spec §4.4, `config.event_mode
    /// == true`): drives each ready connection's `poll_event()` instead of
    /// `process_request()`, surfacing `Headers`/`Data`/`Complete` as they
    /// happen rather than waiting for the whole request to load. One accept
    /// per call, same as `event_read`.
    pub fn event_read_ev(&mut self, ready: &[RawFd]) -> Option<(ConnId, ConnEvent)> {
        if ready.contains(&self.listener.as_raw_fd()) {
            self.accept();
            return None;
        }
        let indices: Vec<usize> = self.order.iter().copied().collect();
        for idx in indices {
            let Some(conn) = self.connections[idx].as_mut() else { continue };
            if conn.is_closed() {
                self.remove(idx);
                continue;
            }
            let Some(fd) = conn.raw_fd() else { continue };
            if !ready.contains(&fd) {
                continue;
            }
            match conn.poll_event() {
                Ok(Some(ev)) => return Some((ConnId(idx), ev)),
                Ok(None) => {}
                Err(_) => self.remove(idx),
            }
        }
        None
    }

    /// Event-mode counterpart of `wait` (spec §4.4/§4.6): same outer loop
    /// shape, but dispatches through `event_read_ev` so the handler is
    /// driven incrementally.
    pub fn wait_ev(&mut self, timeout: Duration) -> Option<(ConnId, ConnEvent)> {
        self.cleanup_idle_connections();
        self.flush_pending_sends();
        let read_fds = self.read_sockets();
        let write_fds = self.write_sockets();
        let (r, w) = poll_ready(&read_fds, &write_fds, timeout).unwrap_or_default();
        if !w.is_empty() {
            self.event_write(&w);
        }
        if r.is_empty() {
            return None;
        }
        self.event_read_ev(&r)
    }

    fn flush_pending_sends(&mut self) {
        let indices: Vec<usize> = self.order.iter().copied().collect();
        for idx in indices {
            let Some(conn) = self.connections[idx].as_mut() else { continue };
            if conn.is_closed() {
                self.remove(idx);
                continue;
            }
            if conn.has_data_to_send() && conn.try_send() {
                conn.finalize_sent_response();
            }
            if conn.is_closed() {
                self.remove(idx);
            }
        }
    }

    /// Scan for requests whose bytes are already sitting in a receive
    /// buffer from an earlier burst (pipelining, spec P2) — no blocking
    /// read required.
    fn check_pipelined_requests(&mut self) -> Option<ConnId> {
        let indices: Vec<usize> = self.order.iter().copied().collect();
        for idx in indices {
            let Some(conn) = self.connections[idx].as_mut() else { continue };
            if conn.is_closed() {
                self.remove(idx);
                continue;
            }
            if conn.is_waiting_for_response() {
                continue;
            }
            if conn.has_buffered_bytes() && !conn.is_loaded() {
                match conn.process_request() {
                    Ok(true) => return Some(ConnId(idx)),
                    Ok(false) => {}
                    Err(_) => self.remove(idx),
                }
            }
        }
        None
    }

    fn cleanup_idle_connections(&mut self) {
        let indices: Vec<usize> = self.order.iter().copied().collect();
        for idx in indices {
            let Some(conn) = self.connections[idx].as_mut() else { continue };
            if !conn.is_loaded() && conn.is_timed_out() {
                tracing::debug!(peer = %conn.addr(), "idle connection timed out, evicting");
                let _ = conn.respond(Response::new(408).body("Request Timeout"));
                self.remove(idx);
            }
        }
    }

    /// Dispatch a `(read_ready, write_ready)` pair from an external
    /// readiness primitive (spec §6). Lets a caller multiplex several
    /// `Server`s behind one `select`/`poll` call.
    pub fn process_events(&mut self, read: &[RawFd], write: &[RawFd]) -> Option<ConnId> {
        if !write.is_empty() {
            self.event_write(write);
        }
        if !read.is_empty() {
            return self.event_read(read);
        }
        None
    }

    /// Convenience outer loop (spec §4.6 `wait`): flush pending writes,
    /// check for already-buffered pipelined requests, otherwise poll for
    /// up to `timeout` and dispatch.
    pub fn wait(&mut self, timeout: Duration) -> Option<ConnId> {
        self.cleanup_idle_connections();
        self.flush_pending_sends();
        if let Some(id) = self.check_pipelined_requests() {
            return Some(id);
        }
        let read_fds = self.read_sockets();
        let write_fds = self.write_sockets();
        let (r, w) = poll_ready(&read_fds, &write_fds, timeout).unwrap_or_default();
        self.process_events(&r, &w)
    }
}
