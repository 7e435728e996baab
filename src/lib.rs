//! `uhttp_engine` — an embedded-friendly, non-blocking HTTP/1.x engine
//! (spec §1/§2). The crate owns parsing, framing, connection lifecycle,
//! keep-alive/pipelining discipline, chunked-to-the-wire streaming, TLS
//! integration (as an external collaborator), multipart push streams and
//! HTTP authentication; the caller owns the readiness-driven event loop.
//!
//! Two halves mirror each other: [`server`] drives inbound connections
//! through a request/response state machine behind [`server::Server`];
//! [`client`] drives outbound requests through [`client::Client`], with
//! transparent Basic/Digest retry and a simple cookie jar.

pub mod body;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod request;
pub mod response;
pub mod server;
pub mod status;
pub mod tls;

pub use body::{Body, RequestBody};
pub use client::{Client, HttpResponse};
pub use config::{ClientConfig, ServerConfig};
pub use error::{HttpError, HttpResult};
pub use request::{Method, Request};
pub use response::Response;
pub use server::{ConnEvent, ConnId, Server};
