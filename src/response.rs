//! The response encoder (spec §4.3): status/header/cookie preamble,
//! Content-Length computation, and the `multipart/x-mixed-replace` frame
//! helpers (spec §4.3/"Multipart push stream"). Grounded on
//! `uhttp_server.py`'s `_build_response_header`/`respond`/
//! `response_multipart*`.

use crate::body::Body;
use crate::codec::Headers;
use crate::error::HttpError;
use crate::status::reason_phrase;

pub const DEFAULT_MULTIPART_BOUNDARY: &str = "frame";

/// A logical response a handler builds up before calling `respond*`
/// (spec §3). Construction is independent of the connection; the
/// connection decides keep-alive and performs the actual write.
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    /// Ordered so repeated `Set-Cookie` lines come out in call order.
    /// `None` means "delete this cookie" (`; Max-Age=0`).
    pub cookies: Vec<(String, Option<String>)>,
    pub body: Body,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Response {
            status,
            headers: Headers::new(),
            cookies: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), Some(value.into())));
        self
    }

    pub fn delete_cookie(mut self, name: impl Into<String>) -> Self {
        self.cookies.push((name.into(), None));
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn ok(body: impl Into<Body>) -> Self {
        Response::new(200).body(body)
    }

    pub fn not_found() -> Self {
        Response::new(404).body("Not Found")
    }

    pub fn redirect(url: impl Into<String>, status: u16) -> Self {
        Response::new(status).header("Location", url.into())
    }
}

/// Serialize the status line, then each header, then each cookie as a
/// `set-cookie` line, then the blank separator. Does not touch the body;
/// callers append body bytes to the same buffer so the whole response is
/// one contiguous write (spec §4.3 step 4 — atomic at the byte level so
/// pipelined responses cannot interleave on the wire).
pub fn encode_preamble(status: u16, headers: &Headers, cookies: &[(String, Option<String>)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", status, reason_phrase(status)).as_bytes());
    for (key, val) in headers.iter() {
        out.extend_from_slice(format!("{key}: {val}\r\n").as_bytes());
    }
    for (name, value) in cookies {
        match value {
            Some(v) => out.extend_from_slice(format!("set-cookie: {name}={v}\r\n").as_bytes()),
            None => out.extend_from_slice(format!("set-cookie: {name}; Max-Age=0\r\n").as_bytes()),
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Build one complete `--boundary\r\n<headers>\r\n\r\n<body>\r\n` multipart
/// frame (spec §4.3 `response_multipart_frame`).
pub fn encode_multipart_frame(
    data: Body,
    mut headers: Headers,
    boundary: &str,
) -> Result<Vec<u8>, HttpError> {
    let body_bytes = data.encode(&mut headers)?;
    let mut out = Vec::with_capacity(64 + body_bytes.len());
    out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    for (key, val) in headers.iter() {
        out.extend_from_slice(format!("{key}: {val}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&body_bytes);
    out.extend_from_slice(b"\r\n");
    Ok(out)
}

pub fn encode_multipart_end(boundary: &str) -> Vec<u8> {
    format!("--{boundary}--\r\n").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_includes_status_line_and_blank_terminator() {
        let headers = Headers::new();
        let out = encode_preamble(200, &headers, &[]);
        let s = String::from_utf8(out).unwrap();
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn cookie_deletion_emits_max_age_zero() {
        let headers = Headers::new();
        let out = encode_preamble(200, &headers, &[("sid".into(), None)]);
        let s = String::from_utf8(out).unwrap();
        assert!(s.contains("set-cookie: sid; Max-Age=0\r\n"));
    }

    #[test]
    fn multipart_frame_wraps_body_in_boundary() {
        let mut headers = Headers::new();
        headers.insert("x", "y");
        let out = encode_multipart_frame(Body::Text("hi".into()), headers, "frame").unwrap();
        let s = String::from_utf8(out).unwrap();
        assert!(s.starts_with("--frame\r\n"));
        assert!(s.ends_with("hi\r\n"));
    }
}
