//! The client-side request state machine (spec §4.7/§4.8/§4.9).
//! Grounded on `uhttp_client.py`'s `HttpClient`: same state names, same
//! "connect is the one blocking section, everything after is
//! non-blocking" contract, same Digest-retry-without-clearing-the-
//! request-descriptor trick.

use crate::body::Body;
use crate::client::auth::{basic_auth_header, build_digest_auth, parse_www_authenticate, DigestParams};
use crate::client::cookies::CookieJar;
use crate::client::response::HttpResponse;
use crate::client::url::{join_path, parse_url};
use crate::codec::{percent_encode, Headers};
use crate::config::ClientConfig;
use crate::error::{HttpError, HttpResult};
use crate::io::{would_block, Socket};
use crate::request::{find_headers_end, Method};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

const USER_AGENT_VALUE: &str = "uhttp-engine-client/0.1";
const MAX_RESPONSE_HEADERS_LENGTH: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting,
    Sending,
    ReceivingHeaders,
    ReceivingBody,
    Complete,
}

/// `k=v` pairs as the caller supplied them; repeated keys are expressed
/// by pushing multiple pairs with the same key, a bare key by `None`.
pub type RequestQuery = Vec<(String, Option<String>)>;

fn encode_query(query: &RequestQuery) -> String {
    if query.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = query
        .iter()
        .map(|(k, v)| match v {
            Some(v) => format!("{}={}", percent_encode(k), percent_encode(v)),
            None => percent_encode(k),
        })
        .collect();
    format!("?{}", parts.join("&"))
}

/// The in-flight request, kept around so a Digest retry can rebuild the
/// identical frame with a fresh `Authorization` header (spec §4.7
/// "re-issue the same request ... without clearing the request
/// descriptor").
#[derive(Clone)]
struct RequestDescriptor {
    method: Method,
    path: String,
    headers: Headers,
    body: Body,
    query: RequestQuery,
    auth: Option<(String, String)>,
}

/// The response fields accumulated across `ReceivingHeaders`/
/// `ReceivingBody` before `finalize_response` turns them into an
/// [`HttpResponse`].
#[derive(Default)]
struct ResponseInProgress {
    status: Option<u16>,
    status_message: String,
    headers: Headers,
    content_length: u64,
}

pub struct Client {
    config: ClientConfig,
    base_path: String,

    socket: Option<Box<dyn Socket>>,
    state: ClientState,
    buffer: Vec<u8>,
    send_buffer: Vec<u8>,

    cookies: CookieJar,
    digest_params: Option<DigestParams>,
    digest_nc: u32,

    request: Option<RequestDescriptor>,
    response: ResponseInProgress,

    deadline: Option<Instant>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Client {
            config,
            base_path: String::new(),
            socket: None,
            state: ClientState::Idle,
            buffer: Vec::new(),
            send_buffer: Vec::new(),
            cookies: CookieJar::new(),
            digest_params: None,
            digest_nc: 0,
            request: None,
            response: ResponseInProgress::default(),
            deadline: None,
        }
    }

    /// Build a client from a URL (spec §6 "Client URL form"). `ssl_context`
    /// is required up front for `https://` targets since TLS is an
    /// external collaborator the engine cannot synthesize a default for.
    pub fn from_url(
        url: &str,
        ssl_context: Option<std::sync::Arc<dyn crate::tls::TlsContext>>,
    ) -> HttpResult<Self> {
        let parsed = parse_url(url)?;
        if parsed.secure && ssl_context.is_none() {
            return Err(HttpError::ConnectionFailed(
                "https:// URL requires an explicit TLS context".to_string(),
            ));
        }
        let mut config = ClientConfig::new(parsed.host).port(parsed.port);
        if let Some(ctx) = ssl_context {
            config = config.ssl_context(ctx);
        }
        if let Some((user, pass)) = parsed.auth {
            config = config.auth(user, pass);
        }
        let mut client = Client::new(config);
        client.base_path = parsed.base_path;
        Ok(client)
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(|s| s.raw_fd())
    }

    /// Readiness projection (spec §2 "Client façade"): non-empty only
    /// while actually waiting to read.
    pub fn read_sockets(&self) -> Vec<RawFd> {
        match self.state {
            ClientState::ReceivingHeaders | ClientState::ReceivingBody => self.raw_fd().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Readiness projection: non-empty only while there is unsent data.
    pub fn write_sockets(&self) -> Vec<RawFd> {
        if self.state == ClientState::Sending && !self.send_buffer.is_empty() {
            self.raw_fd().into_iter().collect()
        } else {
            Vec::new()
        }
    }

    fn effective_auth(&self, request_auth: &Option<(String, String)>) -> Option<(String, String)> {
        request_auth.clone().or_else(|| self.config.auth.clone())
    }

    /// Start a request (spec §4.7 `request`). Fails with `InProgress` if
    /// the previous exchange on this client hasn't completed yet.
    #[allow(clippy::too_many_arguments)]
    pub fn request(
        &mut self,
        method: Method,
        path: impl Into<String>,
        headers: Headers,
        body: impl Into<Body>,
        query: RequestQuery,
        auth: Option<(String, String)>,
    ) -> HttpResult<&mut Self> {
        if self.state != ClientState::Idle {
            return Err(HttpError::InProgress);
        }
        self.request = Some(RequestDescriptor {
            method,
            path: path.into(),
            headers,
            body: body.into(),
            query,
            auth,
        });
        self.response = ResponseInProgress::default();
        self.start_request()?;
        Ok(self)
    }

    pub fn get(&mut self, path: impl Into<String>) -> HttpResult<&mut Self> {
        self.request(Method::Get, path, Headers::new(), Body::Empty, Vec::new(), None)
    }

    pub fn post(&mut self, path: impl Into<String>, body: impl Into<Body>) -> HttpResult<&mut Self> {
        self.request(Method::Post, path, Headers::new(), body, Vec::new(), None)
    }

    pub fn put(&mut self, path: impl Into<String>, body: impl Into<Body>) -> HttpResult<&mut Self> {
        self.request(Method::Put, path, Headers::new(), body, Vec::new(), None)
    }

    pub fn delete(&mut self, path: impl Into<String>) -> HttpResult<&mut Self> {
        self.request(Method::Delete, path, Headers::new(), Body::Empty, Vec::new(), None)
    }

    fn connect(&mut self) -> HttpResult<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let addrs = (self.config.host.as_str(), self.config.port.unwrap_or(80))
            .to_socket_addrs()
            .map_err(|e| HttpError::ConnectionFailed(format!("cannot resolve {}: {e}", self.config.host)))?;
        let addr = addrs
            .into_iter()
            .next()
            .ok_or_else(|| HttpError::ConnectionFailed(format!("cannot resolve {}", self.config.host)))?;

        let stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout)
            .map_err(|e| HttpError::ConnectionFailed(format!("connect failed: {e}")))?;

        let socket: Box<dyn Socket> = match &self.config.ssl_context {
            Some(ctx) => ctx
                .wrap_socket(stream, false, Some(self.config.host.as_str()))
                .map_err(|e| HttpError::ConnectionFailed(format!("TLS handshake failed: {e}")))?,
            None => Box::new(stream),
        };
        socket
            .set_nonblocking(true)
            .map_err(|e| HttpError::ConnectionFailed(format!("set_nonblocking failed: {e}")))?;

        tracing::trace!(host = %self.config.host, port = addr.port(), "connected");
        self.socket = Some(socket);
        Ok(())
    }

    fn build_request_frame(&mut self) -> HttpResult<Vec<u8>> {
        let req = self.request.as_ref().expect("build_request_frame without a request").clone();
        let mut headers = req.headers;

        let path = join_path(&self.base_path, &req.path);
        let full_path = format!("{path}{}", encode_query(&req.query));

        if !headers.contains_key("host") {
            let default_port = if self.config.ssl_context.is_some() { 443 } else { 80 };
            let port = self.config.port.unwrap_or(default_port);
            if port == default_port {
                headers.insert("host", self.config.host.clone());
            } else {
                headers.insert("host", format!("{}:{port}", self.config.host));
            }
        }
        if !headers.contains_key("user-agent") {
            headers.insert("user-agent", USER_AGENT_VALUE);
        }
        if let Some(cookie_header) = self.cookies.header_value() {
            headers.insert("cookie", cookie_header);
        }

        let auth = self.effective_auth(&req.auth);
        if let Some((user, pass)) = &auth {
            if !headers.contains_key("authorization") {
                let value = match &self.digest_params {
                    Some(params) => {
                        self.digest_nc += 1;
                        build_digest_auth(user, pass, req.method.as_str(), &full_path, params, self.digest_nc)
                    }
                    None => basic_auth_header(user, pass),
                };
                headers.insert("authorization", value);
            }
        }

        let body_bytes = req.body.encode(&mut headers)?;

        let mut out = format!("{} {full_path} HTTP/1.1\r\n", req.method.as_str()).into_bytes();
        for (key, val) in headers.iter() {
            out.extend_from_slice(format!("{key}: {val}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&body_bytes);
        Ok(out)
    }

    fn start_request(&mut self) -> HttpResult<()> {
        self.connect()?;
        let frame = self.build_request_frame()?;
        self.send_buffer.extend_from_slice(&frame);
        self.buffer.clear();
        self.response = ResponseInProgress::default();
        self.state = ClientState::Sending;
        self.deadline = Some(Instant::now() + self.config.idle_timeout);
        self.try_send()?;
        Ok(())
    }

    fn try_send(&mut self) -> HttpResult<()> {
        while !self.send_buffer.is_empty() {
            let socket = self.socket.as_mut().ok_or(HttpError::Disconnected)?;
            match socket.write(&self.send_buffer) {
                Ok(0) => break,
                Ok(n) => {
                    self.send_buffer.drain(..n);
                }
                Err(e) if would_block(&e) => break,
                Err(e) => return Err(HttpError::ConnectionFailed(format!("send failed: {e}"))),
            }
        }
        if self.send_buffer.is_empty() {
            self.state = ClientState::ReceivingHeaders;
        }
        Ok(())
    }

    fn recv_to_buffer(&mut self, max_total: usize) -> HttpResult<()> {
        if self.buffer.len() >= max_total {
            return Ok(());
        }
        let want = max_total - self.buffer.len();
        let mut chunk = vec![0u8; want];
        let socket = self.socket.as_mut().ok_or(HttpError::Disconnected)?;
        match socket.read(&mut chunk) {
            Ok(0) => Err(HttpError::Disconnected),
            Ok(n) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                Ok(())
            }
            Err(e) if would_block(&e) => Ok(()),
            Err(e) => Err(HttpError::ConnectionFailed(format!("recv failed: {e}"))),
        }
    }

    fn process_recv_headers(&mut self) -> HttpResult<()> {
        self.recv_to_buffer(MAX_RESPONSE_HEADERS_LENGTH)?;
        let Some((pos, dlen)) = find_headers_end(&self.buffer) else {
            if self.buffer.len() >= MAX_RESPONSE_HEADERS_LENGTH {
                return Err(HttpError::ResponseError("response headers too large".to_string()));
            }
            return Ok(());
        };
        let header_region: Vec<u8> = self.buffer.drain(..pos + dlen).collect();
        self.parse_status_and_headers(&header_region)?;

        if self.response.content_length > self.config.max_response_length {
            return Err(HttpError::ResponseError(format!(
                "response too large: {}",
                self.response.content_length
            )));
        }
        self.state = if self.response.content_length == 0 || self.buffer.len() as u64 >= self.response.content_length
        {
            ClientState::Complete
        } else {
            ClientState::ReceivingBody
        };
        Ok(())
    }

    fn parse_status_and_headers(&mut self, header_region: &[u8]) -> HttpResult<()> {
        let mut lines = crate::request::split_lines(header_region).into_iter();

        let status_line = lines
            .next()
            .ok_or_else(|| HttpError::ResponseError("empty response".to_string()))?;
        let status_line = std::str::from_utf8(status_line)
            .map_err(|_| HttpError::ResponseError("status line is not ASCII/UTF-8".to_string()))?;
        let mut parts = status_line.splitn(3, ' ');
        let (Some(protocol), Some(status_s), message) = (parts.next(), parts.next(), parts.next()) else {
            return Err(HttpError::ResponseError(format!("invalid status line: {status_line}")));
        };
        if !protocol.starts_with("HTTP/") {
            return Err(HttpError::ResponseError(format!("invalid protocol: {protocol}")));
        }
        let status: u16 = status_s
            .parse()
            .map_err(|_| HttpError::ResponseError(format!("invalid status code: {status_s}")))?;

        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (key, val) = crate::codec::parse_header_line(line)?;
            headers.insert(key, val);
        }

        for (key, val) in headers.iter() {
            if key.eq_ignore_ascii_case("set-cookie") {
                self.cookies.absorb(val);
            }
        }

        self.response.content_length = headers.get("content-length").and_then(|v| v.parse().ok()).unwrap_or(0);
        self.response.status = Some(status);
        self.response.status_message = message.unwrap_or("").to_string();
        self.response.headers = headers;
        Ok(())
    }

    fn process_recv_body(&mut self) -> HttpResult<()> {
        if self.buffer.len() as u64 >= self.response.content_length {
            self.state = ClientState::Complete;
            return Ok(());
        }
        self.recv_to_buffer(self.response.content_length as usize)?;
        if self.buffer.len() as u64 >= self.response.content_length {
            self.state = ClientState::Complete;
        }
        Ok(())
    }

    fn should_keep_alive(&self) -> bool {
        !matches!(self.response.headers.get("connection"), Some(v) if v.eq_ignore_ascii_case("close"))
    }

    fn close(&mut self) {
        if let Some(mut s) = self.socket.take() {
            s.shutdown();
        }
        self.state = ClientState::Idle;
        self.buffer.clear();
        self.send_buffer.clear();
    }

    /// Finalize a `Complete` exchange: either trigger the one-shot Digest
    /// retry (spec §4.8/P8), or hand back the finished response.
    fn finalize_response(&mut self) -> HttpResult<Option<HttpResponse>> {
        let status = self.response.status.unwrap_or(0);
        let req_auth = self.request.as_ref().and_then(|r| r.auth.clone());
        let auth = self.effective_auth(&req_auth);

        if status == 401 && auth.is_some() && self.digest_params.is_none() {
            if let Some(www_auth) = self.response.headers.get("www-authenticate") {
                if www_auth.to_ascii_lowercase().starts_with("digest") {
                    let directives = parse_www_authenticate(www_auth);
                    self.digest_params = Some(DigestParams::from_challenge(&directives)?);
                    self.digest_nc = 0;
                    tracing::debug!("401 Digest challenge received, retrying with computed Authorization");
                    if !self.should_keep_alive() {
                        self.close();
                    } else {
                        self.buffer.clear();
                        self.send_buffer.clear();
                    }
                    self.start_request()?;
                    return Ok(None);
                }
            }
        }

        let body = std::mem::take(&mut self.buffer);
        let body = body.into_iter().take(self.response.content_length as usize).collect();
        let response = HttpResponse::new(
            status,
            std::mem::take(&mut self.response.status_message),
            std::mem::replace(&mut self.response.headers, Headers::new()),
            body,
        );

        if !self.should_keep_alive() {
            self.close();
        } else {
            self.buffer.clear();
            self.send_buffer.clear();
            self.state = ClientState::Idle;
        }
        self.request = None;
        self.deadline = None;
        Ok(Some(response))
    }

    /// Drive the state machine by readiness (spec §4.7 `process_events`).
    /// Returns `Some(response)` once the exchange (including any
    /// transparent Digest retry) has completed.
    pub fn process_events(&mut self, read_ready: bool, write_ready: bool) -> HttpResult<Option<HttpResponse>> {
        if self.state == ClientState::Idle {
            return Ok(None);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                self.close();
                return Err(HttpError::Timeout);
            }
        }

        let result = (|| -> HttpResult<()> {
            if write_ready && self.state == ClientState::Sending {
                self.try_send()?;
            }
            if read_ready {
                match self.state {
                    ClientState::ReceivingHeaders => self.process_recv_headers()?,
                    ClientState::ReceivingBody => self.process_recv_body()?,
                    _ => {}
                }
            }
            Ok(())
        })();

        if let Err(e) = result {
            self.close();
            return Err(e);
        }

        if self.state == ClientState::Complete {
            return self.finalize_response();
        }
        Ok(None)
    }

    /// Blocking convenience loop (spec §4.7 `wait`): poll readiness for
    /// up to the configured idle timeout on each iteration until the
    /// exchange completes.
    pub fn wait(&mut self, timeout: Option<Duration>) -> HttpResult<HttpResponse> {
        if self.state == ClientState::Idle {
            return Err(HttpError::ClientMisuse("no request in progress".to_string()));
        }
        let poll_timeout = timeout.unwrap_or(self.config.idle_timeout);
        loop {
            let read_fds = self.read_sockets();
            let write_fds = self.write_sockets();
            let (r, w) = crate::io::poll_ready(&read_fds, &write_fds, poll_timeout)
                .map_err(|e| HttpError::ConnectionFailed(format!("poll failed: {e}")))?;
            if r.is_empty() && w.is_empty() {
                if let Some(deadline) = self.deadline {
                    if Instant::now() > deadline {
                        self.close();
                        return Err(HttpError::Timeout);
                    }
                }
                continue;
            }
            let read_ready = !r.is_empty();
            let write_ready = !w.is_empty();
            if let Some(response) = self.process_events(read_ready, write_ready)? {
                return Ok(response);
            }
        }
    }
}
