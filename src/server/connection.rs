//! Per-client connection state machine (spec §4.2–§4.6, §3). Grounded on
//! `uhttp_server.py`'s `HttpConnection`, generalized from its single
//! mutable-object-doubles-as-request-and-response design into a Rust
//! state machine that hands the caller an owned [`Request`] while the
//! `Connection` itself keeps what it needs (protocol, keep-alive inputs)
//! to finish the exchange.

use crate::body::{Body, RequestBody};
use crate::codec::Headers;
use crate::config::ServerConfig;
use crate::error::{HttpError, HttpResult};
use crate::io::{Socket, would_block};
use crate::request::{self, Request, find_headers_end};
use crate::response::{
    DEFAULT_MULTIPART_BOUNDARY, Response, encode_multipart_end, encode_multipart_frame,
    encode_preamble,
};
use crate::status::content_type_for_extension;
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Event delivered to the handler in event mode (spec §4.4). There is no
/// `Error` variant: I/O and protocol failures surface as `Err` from
/// [`Connection::poll_event`] instead, following the "results over
/// sentinel events" design note (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnEvent {
    /// Headers and a complete body both arrived in one readiness burst.
    Request,
    /// Headers are parsed; body has not (fully) arrived. The handler
    /// must call `accept_body()`/`accept_body_to_file()` or respond with
    /// a final status to reject the body.
    Headers,
    /// More body bytes have been appended since the last event; drain
    /// them with `read_buffer()`.
    Data,
    /// `content_length` bytes have now been received.
    Complete,
}

pub struct Connection {
    socket: Option<Box<dyn Socket>>,
    addr: SocketAddr,
    buffer: Vec<u8>,
    send_buffer: Vec<u8>,
    rx_bytes_counter: u64,

    head: Option<request::RequestHead>,
    body: Option<RequestBody>,

    is_multipart: bool,
    response_started: bool,
    response_keep_alive: bool,
    file_handle: Option<File>,

    last_activity: Instant,
    requests_count: u32,

    event_mode: bool,
    body_accepted: bool,
    sent_100_continue: bool,
    /// Body bytes already handed to the handler via `read_buffer()` or
    /// streamed into `accept_sink`, not counting what's still sitting in
    /// `buffer` (spec §4.4 `DATA`/`COMPLETE` bookkeeping).
    delivered: u64,
    accept_sink: Option<File>,

    max_headers_length: usize,
    max_content_length: u64,
    file_chunk_size: usize,
    keep_alive_timeout: Duration,
    keep_alive_max_requests: u32,
}

impl Connection {
    pub fn new(socket: Box<dyn Socket>, addr: SocketAddr, config: &ServerConfig) -> Self {
        Connection {
            socket: Some(socket),
            addr,
            buffer: Vec::new(),
            send_buffer: Vec::new(),
            rx_bytes_counter: 0,
            head: None,
            body: None,
            is_multipart: false,
            response_started: false,
            response_keep_alive: false,
            file_handle: None,
            last_activity: Instant::now(),
            requests_count: 0,
            event_mode: config.event_mode,
            body_accepted: false,
            sent_100_continue: false,
            delivered: 0,
            accept_sink: None,
            max_headers_length: config.max_headers_length as usize,
            max_content_length: config.max_content_length,
            file_chunk_size: config.file_chunk_size,
            keep_alive_timeout: config.keep_alive_timeout,
            keep_alive_max_requests: config.keep_alive_max_requests,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn raw_fd(&self) -> Option<std::os::fd::RawFd> {
        self.socket.as_ref().map(|s| s.raw_fd())
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_loaded(&self) -> bool {
        self.head.is_some() && self.body.is_some()
    }

    pub fn is_waiting_for_response(&self) -> bool {
        self.is_loaded() && !self.response_started
    }

    pub fn is_timed_out(&self) -> bool {
        self.last_activity.elapsed() > self.keep_alive_timeout
    }

    pub fn is_max_requests_reached(&self) -> bool {
        self.requests_count >= self.keep_alive_max_requests
    }

    pub fn has_data_to_send(&self) -> bool {
        !self.send_buffer.is_empty() || self.file_handle.is_some()
    }

    pub fn has_buffered_bytes(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Take ownership of the loaded request for the handler. Leaves the
    /// connection's header/protocol state intact (needed by
    /// `should_keep_alive` once the handler calls `respond*`); the body is
    /// moved out and replaced with `Empty` since it is read exactly once.
    pub fn take_request(&mut self) -> Request {
        let head = self
            .head
            .as_ref()
            .expect("take_request called before the request finished loading");
        let body = self.body.replace(RequestBody::Empty).unwrap_or(RequestBody::Empty);
        Request {
            method: head.method,
            url: head.url.clone(),
            protocol: head.protocol,
            path: head.path.clone(),
            query: head.query.clone(),
            headers: head.headers.clone(),
            body,
        }
    }

    /// Read whatever is available up to `target_len` total buffered
    /// bytes. EAGAIN/EWOULDBLOCK is not an error — it just means no
    /// progress this turn (spec §7 "Transient I/O").
    fn recv_to_buffer(&mut self, target_len: usize) -> HttpResult<()> {
        if self.buffer.len() >= target_len {
            return Ok(());
        }
        let want = target_len - self.buffer.len();
        let mut chunk = vec![0u8; want];
        let socket = self.socket.as_mut().ok_or(HttpError::Disconnected)?;
        match socket.read(&mut chunk) {
            Ok(0) => Err(HttpError::Disconnected),
            Ok(n) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                self.rx_bytes_counter += n as u64;
                self.touch();
                Ok(())
            }
            Err(e) if would_block(&e) => Ok(()),
            Err(_) => Err(HttpError::Disconnected),
        }
    }

    fn read_headers(&mut self) -> HttpResult<()> {
        if let Some((pos, dlen)) = find_headers_end(&self.buffer) {
            return self.process_headers(pos, dlen);
        }
        self.recv_to_buffer(self.max_headers_length)?;
        if let Some((pos, dlen)) = find_headers_end(&self.buffer) {
            return self.process_headers(pos, dlen);
        }
        if self.buffer.len() >= self.max_headers_length {
            return Err(HttpError::protocol(
                431,
                format!("headers exceeded {} bytes", self.max_headers_length),
            ));
        }
        Ok(())
    }

    fn process_headers(&mut self, pos: usize, delim_len: usize) -> HttpResult<()> {
        let head = request::parse_head(&self.buffer[..pos])?;
        self.buffer.drain(..pos + delim_len);
        if let Some(cl) = head.content_length {
            if cl > self.max_content_length {
                return Err(HttpError::protocol(413, "payload too large"));
            }
        }
        // Whole-request mode (spec §4.2 100-continue): the engine decides
        // on the handler's behalf and sends the interim response before
        // reading the body. In event mode the handler decides instead,
        // via `accept_body()` once it has seen the `HEADERS` event.
        if !self.event_mode && wants_100_continue(&head) {
            self.sent_100_continue = true;
            self.queue_send(b"HTTP/1.1 100 Continue\r\n\r\n".to_vec());
        }
        self.head = Some(head);
        self.try_complete_body()
    }

    fn try_complete_body(&mut self) -> HttpResult<()> {
        let head = self.head.as_ref().expect("head parsed before body");
        match head.content_length {
            None | Some(0) => {
                self.body = Some(RequestBody::Empty);
            }
            Some(cl) => {
                if (self.buffer.len() as u64) < cl {
                    return Ok(());
                }
                let data: Vec<u8> = self.buffer.drain(..cl as usize).collect();
                let content_type = head.headers.get("content-type").unwrap_or("").to_string();
                self.body = Some(RequestBody::decode(&content_type, data)?);
            }
        }
        Ok(())
    }

    /// Advance the request state machine by one step. Returns `Ok(true)`
    /// once the request is fully loaded. A protocol error writes the
    /// error response synchronously and is returned to the caller, which
    /// removes the connection (spec §4.10).
    pub fn process_request(&mut self) -> HttpResult<bool> {
        if self.socket.is_none() || self.is_multipart {
            return Ok(false);
        }
        if self.is_waiting_for_response() {
            return Ok(false);
        }
        let result = if self.head.is_none() {
            self.read_headers()
        } else {
            match self.head.as_ref().and_then(|h| h.content_length) {
                Some(cl) if cl > 0 => {
                    self.recv_to_buffer(cl as usize).and_then(|_| self.try_complete_body())
                }
                _ => Ok(()),
            }
        };
        match result {
            Ok(()) => {
                let loaded = self.is_loaded();
                if loaded {
                    self.requests_count += 1;
                }
                Ok(loaded)
            }
            Err(HttpError::Protocol { status, message }) => {
                tracing::warn!(peer = %self.addr, status, %message, "protocol error, closing connection");
                let _ = self.respond(Response::new(status).body(message.clone()));
                Err(HttpError::protocol(status, message))
            }
            Err(e) => Err(e),
        }
    }

    /// The parsed request line/headers, available once the `HEADERS` event
    /// fires, before the body has finished arriving (spec §4.4).
    pub fn request_head(&self) -> Option<&request::RequestHead> {
        self.head.as_ref()
    }

    /// Drain body bytes that have arrived since the last call, up to
    /// whatever remains of `content_length` (spec §4.4 `DATA`). Returns an
    /// empty vec if nothing new has arrived.
    pub fn read_buffer(&mut self) -> Vec<u8> {
        let cl = self.head.as_ref().and_then(|h| h.content_length).unwrap_or(0);
        let remaining = cl.saturating_sub(self.delivered);
        let n = (self.buffer.len() as u64).min(remaining) as usize;
        let data: Vec<u8> = self.buffer.drain(..n).collect();
        self.delivered += data.len() as u64;
        data
    }

    /// The handler's go-ahead to receive the body (spec §4.4): sends the
    /// deferred 100-continue preamble, if the client asked for one, now
    /// that the handler has chosen to accept the body rather than reject
    /// it outright with a final status.
    pub fn accept_body(&mut self) -> HttpResult<()> {
        if self.body_accepted {
            return Ok(());
        }
        self.body_accepted = true;
        if let Some(head) = &self.head {
            if wants_100_continue(head) && !self.sent_100_continue {
                self.sent_100_continue = true;
                self.queue_send(b"HTTP/1.1 100 Continue\r\n\r\n".to_vec());
            }
        }
        Ok(())
    }

    /// Like `accept_body`, but stream the arriving body straight to a file
    /// on disk instead of handing chunks to the handler via `read_buffer`
    /// (spec §4.4, mirrors `respond_file` on the send side).
    pub fn accept_body_to_file(&mut self, path: &str) -> HttpResult<()> {
        let file = File::create(path).map_err(|_| {
            HttpError::protocol(500, format!("could not create {path}"))
        })?;
        self.accept_sink = Some(file);
        self.accept_body()
    }

    /// Event-mode equivalent of `process_request` (spec §4.4). Rather than
    /// blocking the caller until the whole request is loaded, delivers one
    /// event per readiness turn: `Headers` as soon as the request line and
    /// headers are parsed, then `Data`/`Complete` as the body streams in
    /// once the handler has called `accept_body()`. `Request` covers the
    /// degenerate case where headers and the entire body both arrived in
    /// the same burst, so the handler never sees a separate `Headers`
    /// event for bodyless (or already-fully-buffered) requests.
    pub fn poll_event(&mut self) -> HttpResult<Option<ConnEvent>> {
        if self.socket.is_none() || self.is_multipart {
            return Ok(None);
        }
        if self.is_waiting_for_response() {
            return Ok(None);
        }

        if self.head.is_none() {
            let result = self.read_headers();
            return match result {
                // `read_headers` -> `process_headers` already runs
                // `try_complete_body` once it has a parsed head, so
                // `is_loaded()` tells us whether the body rode in on the
                // same burst as the headers (-> `Request`) or headers
                // merely finished parsing (-> `Headers`); `self.head` is
                // still `None` if the header region itself isn't complete.
                Ok(()) if self.head.is_none() => Ok(None),
                Ok(()) if self.is_loaded() => {
                    self.requests_count += 1;
                    Ok(Some(ConnEvent::Request))
                }
                Ok(()) => Ok(Some(ConnEvent::Headers)),
                Err(HttpError::Protocol { status, message }) => {
                    let _ = self.respond(Response::new(status).body(message.clone()));
                    Err(HttpError::protocol(status, message))
                }
                Err(e) => Err(e),
            };
        }

        if self.is_loaded() || !self.body_accepted {
            return Ok(None);
        }

        let cl = self.head.as_ref().and_then(|h| h.content_length).unwrap_or(0);
        let before = self.delivered + self.buffer.len() as u64;
        let chunk = self.file_chunk_size.max(1);
        self.recv_to_buffer(self.buffer.len() + chunk)?;
        let have = self.delivered + self.buffer.len() as u64;

        if have >= cl {
            if let Some(sink) = self.accept_sink.as_mut() {
                let data: Vec<u8> = self.buffer.drain(..).collect();
                if !data.is_empty() {
                    std::io::Write::write_all(sink, &data)
                        .map_err(|_| HttpError::protocol(500, "write to accept sink failed"))?;
                }
                self.delivered = cl;
            }
            self.body = Some(RequestBody::Empty);
            self.requests_count += 1;
            Ok(Some(ConnEvent::Complete))
        } else if have > before {
            Ok(Some(ConnEvent::Data))
        } else {
            Ok(None)
        }
    }

    fn should_keep_alive(&self, response_headers: Option<&Headers>) -> bool {
        if let Some(h) = response_headers {
            if let Some(v) = h.get("connection") {
                return v.eq_ignore_ascii_case("keep-alive");
            }
        }
        let req_connection = self
            .head
            .as_ref()
            .and_then(|h| h.headers.get("connection"))
            .unwrap_or("");
        let protocol = self.head.as_ref().map(|h| h.protocol).unwrap_or("HTTP/1.0");
        let mut keep_alive = if protocol == "HTTP/1.1" {
            !req_connection.eq_ignore_ascii_case("close")
        } else {
            req_connection.eq_ignore_ascii_case("keep-alive")
        };
        if keep_alive && self.is_max_requests_reached() {
            keep_alive = false;
        }
        keep_alive
    }

    fn queue_send(&mut self, data: Vec<u8>) {
        self.send_buffer.extend_from_slice(&data);
        self.try_send();
    }

    /// Respond with a single complete response (spec §4.3 `respond`).
    /// Header and body are queued as one contiguous write so pipelined
    /// responses cannot interleave on the wire.
    pub fn respond(&mut self, mut response: Response) -> HttpResult<()> {
        if self.socket.is_none() {
            return Ok(());
        }
        if self.response_started {
            return Err(HttpError::AlreadySent);
        }
        self.response_started = true;
        self.is_multipart = false;

        let body_bytes = response.body.encode(&mut response.headers)?;
        let keep_alive = self.should_keep_alive(Some(&response.headers));
        if !response.headers.contains_key("connection") {
            response
                .headers
                .insert("connection", if keep_alive { "keep-alive" } else { "close" });
        }
        self.response_keep_alive = keep_alive;

        let mut out = encode_preamble(response.status, &response.headers, &response.cookies);
        out.extend_from_slice(&body_bytes);
        self.queue_send(out);
        if !self.has_data_to_send() {
            self.finalize_sent_response();
        }
        Ok(())
    }

    /// Respond by streaming a file from disk in `file_chunk_size` chunks
    /// (spec §4.4/P10): the response never holds more than one chunk in
    /// memory at a time.
    pub fn respond_file(&mut self, path: &str, mut headers: Headers) -> HttpResult<()> {
        if self.response_started {
            return Err(HttpError::AlreadySent);
        }
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => return self.respond(Response::new(404).body(format!("File not found: {path}"))),
        };

        if !headers.contains_key("content-type") {
            let ext = path.rsplit('.').next().unwrap_or("");
            headers.insert("content-type", content_type_for_extension(ext));
        }
        headers.insert("content-length", metadata.len().to_string());
        let keep_alive = self.should_keep_alive(Some(&headers));
        if !headers.contains_key("connection") {
            headers.insert("connection", if keep_alive { "keep-alive" } else { "close" });
        }
        self.response_keep_alive = keep_alive;
        self.response_started = true;
        self.is_multipart = false;

        let preamble = encode_preamble(200, &headers, &[]);
        self.queue_send(preamble);

        match File::open(path) {
            Ok(f) => {
                self.file_handle = Some(f);
                self.try_send();
                Ok(())
            }
            Err(_) => {
                self.close();
                Ok(())
            }
        }
    }

    /// Start a `multipart/x-mixed-replace` push stream (spec §4.4).
    pub fn response_multipart(&mut self, mut headers: Headers) -> HttpResult<bool> {
        if self.socket.is_none() {
            return Ok(false);
        }
        if self.response_started {
            return Err(HttpError::AlreadySent);
        }
        self.response_started = true;
        self.is_multipart = true;
        if !headers.contains_key("content-type") {
            headers.insert(
                "content-type",
                format!("multipart/x-mixed-replace; boundary={DEFAULT_MULTIPART_BOUNDARY}"),
            );
        }
        let preamble = encode_preamble(200, &headers, &[]);
        self.queue_send(preamble);
        Ok(true)
    }

    pub fn response_multipart_frame(&mut self, body: Body, headers: Headers) -> HttpResult<bool> {
        if self.socket.is_none() {
            return Ok(false);
        }
        let frame = encode_multipart_frame(body, headers, DEFAULT_MULTIPART_BOUNDARY)?;
        self.queue_send(frame);
        Ok(true)
    }

    pub fn response_multipart_end(&mut self) {
        self.is_multipart = false;
        self.response_keep_alive = self.should_keep_alive(None);
        self.queue_send(encode_multipart_end(DEFAULT_MULTIPART_BOUNDARY));
        if !self.has_data_to_send() {
            self.finalize_sent_response();
        }
    }

    pub fn respond_redirect(
        &mut self,
        url: impl Into<String>,
        status: u16,
        cookies: Vec<(String, Option<String>)>,
    ) -> HttpResult<()> {
        let mut response = Response::new(status).header("location", url.into());
        for (name, value) in cookies {
            response = match value {
                Some(v) => response.cookie(name, v),
                None => response.delete_cookie(name),
            };
        }
        self.respond(response)
    }

    /// Drain as much of the send buffer (and any active file stream) as
    /// the socket will currently accept. Returns `true` once everything
    /// has been flushed.
    pub fn try_send(&mut self) -> bool {
        if self.socket.is_none() {
            return false;
        }

        if self.file_handle.is_some() && self.send_buffer.len() < self.file_chunk_size {
            let mut chunk = vec![0u8; self.file_chunk_size];
            let read_result = self.file_handle.as_mut().unwrap().read(&mut chunk);
            match read_result {
                Ok(0) => self.file_handle = None,
                Ok(n) => self.send_buffer.extend_from_slice(&chunk[..n]),
                Err(_) => {
                    self.file_handle = None;
                    self.close();
                    return false;
                }
            }
        }

        if self.send_buffer.is_empty() {
            return self.file_handle.is_none();
        }

        let write_result = self.socket.as_mut().unwrap().write(&self.send_buffer);
        match write_result {
            Ok(n) if n > 0 => {
                self.send_buffer.drain(..n);
                self.send_buffer.is_empty() && self.file_handle.is_none()
            }
            Ok(_) => false,
            Err(e) if would_block(&e) => false,
            Err(_) => {
                self.close();
                false
            }
        }
    }

    pub fn finalize_sent_response(&mut self) {
        if self.is_multipart {
            return;
        }
        if self.response_keep_alive {
            self.reset();
        } else {
            self.close();
        }
    }

    /// Reset for the next request on a kept-alive connection. The receive
    /// buffer is left untouched — it may already hold the start of a
    /// pipelined next request.
    pub fn reset(&mut self) {
        self.file_handle = None;
        self.head = None;
        self.body = None;
        self.is_multipart = false;
        self.response_started = false;
        self.response_keep_alive = false;
        self.body_accepted = false;
        self.sent_100_continue = false;
        self.delivered = 0;
        self.accept_sink = None;
        self.touch();
    }

    pub fn close(&mut self) {
        self.file_handle = None;
        self.accept_sink = None;
        if let Some(mut socket) = self.socket.take() {
            socket.shutdown();
        }
        self.send_buffer.clear();
    }
}

/// Whether the client asked us to defer the body behind a 100-continue
/// round trip (spec §4.2).
fn wants_100_continue(head: &request::RequestHead) -> bool {
    head.headers
        .get("expect")
        .map(|v| v.eq_ignore_ascii_case("100-continue"))
        .unwrap_or(false)
}
