//! Central error taxonomy for the engine (spec §7).
//!
//! Every fallible path maps onto one of these kinds. Protocol errors carry
//! the HTTP status that the engine writes to the wire before the
//! connection is torn down; the rest cover disconnection, transport
//! failures, and client-side misuse.

use std::io;
use thiserror::Error;

/// Server- and client-side error kinds.
#[derive(Debug, Error)]
pub enum HttpError {
    /// A parser or request-validation failure that must be answered with a
    /// specific status before the connection closes (spec §4.2/§7).
    #[error("{status} {message}")]
    Protocol { status: u16, message: String },

    /// Peer closed the connection mid-request (EOF on an expected read).
    #[error("peer disconnected")]
    Disconnected,

    /// Underlying OS/network I/O error. `EAGAIN`/`EWOULDBLOCK` never reach
    /// this variant — callers see a clean "no progress yet" and retry on
    /// the next readiness edge.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `respond*` was invoked a second time for the same request, or a
    /// final response was attempted while a multipart stream was active.
    #[error("response already sent for this request")]
    AlreadySent,

    /// Client issued `request()` while a previous request on the same
    /// connection had not yet completed.
    #[error("a request is already in progress on this client")]
    InProgress,

    /// Client could not resolve the host, connect, or complete a TLS
    /// handshake.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Client received a malformed status line, malformed header, or
    /// oversize headers/body.
    #[error("invalid response: {0}")]
    ResponseError(String),

    /// Client per-request deadline expired before completion.
    #[error("request timed out")]
    Timeout,

    /// Client logic error: invalid body type, `wait()` with no request in
    /// flight, or similar misuse of the façade.
    #[error("client error: {0}")]
    ClientMisuse(String),

    /// Digest challenge named an algorithm other than `MD5`/`MD5-SESS`.
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

impl HttpError {
    /// Build a protocol error carrying the HTTP status to answer with.
    pub fn protocol(status: u16, message: impl Into<String>) -> Self {
        HttpError::Protocol {
            status,
            message: message.into(),
        }
    }

    /// The HTTP status this error should be answered with on the wire, if
    /// any (only `Protocol` errors carry one).
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type HttpResult<T> = Result<T, HttpError>;
