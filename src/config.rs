//! Server/client configuration structs (spec §6 "Configuration"). Plain
//! builder structs with `Default` impls holding the documented defaults —
//! no external config-file format is in scope, matching SPEC_FULL's
//! ambient-stack decision to keep this a typed builder rather than an
//! env-file loader.

use crate::io::TlsContext;
use std::sync::Arc;
use std::time::Duration;

const KB: u64 = 1024;

/// Server-side configuration (spec §6 "Configuration (server)").
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub ssl_context: Option<Arc<dyn TlsContext>>,
    pub listen_backlog: i32,
    pub max_waiting_clients: usize,
    pub max_headers_length: u64,
    pub max_content_length: u64,
    pub file_chunk_size: usize,
    pub keep_alive_timeout: Duration,
    pub keep_alive_max_requests: u32,
    /// When set, the multiplexer surfaces readiness events instead of
    /// driving its own `wait()` loop (spec §4.6's `event_mode`).
    pub event_mode: bool,
}

impl ServerConfig {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        ServerConfig {
            address: address.into(),
            port,
            ..ServerConfig::default()
        }
    }

    pub fn ssl_context(mut self, ctx: Arc<dyn TlsContext>) -> Self {
        self.ssl_context = Some(ctx);
        self
    }

    pub fn event_mode(mut self, on: bool) -> Self {
        self.event_mode = on;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "0.0.0.0".to_string(),
            port: 8080,
            ssl_context: None,
            listen_backlog: 2,
            max_waiting_clients: 5,
            max_headers_length: 4 * KB,
            max_content_length: 512 * KB,
            file_chunk_size: 4 * KB as usize,
            keep_alive_timeout: Duration::from_secs(15),
            keep_alive_max_requests: 100,
            event_mode: false,
        }
    }
}

/// Client-side configuration (spec §6 "Configuration (client)").
pub struct ClientConfig {
    pub host: String,
    pub port: Option<u16>,
    pub ssl_context: Option<Arc<dyn TlsContext>>,
    pub auth: Option<(String, String)>,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_response_length: u64,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        ClientConfig {
            host: host.into(),
            ..ClientConfig::default()
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn ssl_context(mut self, ctx: Arc<dyn TlsContext>) -> Self {
        self.ssl_context = Some(ctx);
        self
    }

    pub fn auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.auth = Some((user.into(), pass.into()));
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: String::new(),
            port: None,
            ssl_context: None,
            auth: None,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            max_response_length: KB * KB,
        }
    }
}
