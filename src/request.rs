//! The request-line/header parser and the handler-facing `Request` object
//! (spec §3/§4.2). Grounded on `uhttp_server.py`'s `HttpConnection`
//! `_parse_http_request`/`_process_headers`, generalized into a
//! standalone function operating on a byte slice rather than mutating an
//! object in place, so it composes with the incremental buffer-driven
//! state machine in `server::connection`.

use crate::body::RequestBody;
use crate::codec::{Headers, Query, parse_header_line, parse_url_path};
use crate::error::HttpError;
use crate::status::{is_known_method, is_known_protocol};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Connect => "CONNECT",
            Method::Delete => "DELETE",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Trace => "TRACE",
        }
    }

    /// Parse an uppercase method token, the same set `parse_request_line`
    /// accepts, for callers building a request outside the wire parser
    /// (e.g. the CLI front end).
    pub fn parse(s: &str) -> Option<Method> {
        Some(match s {
            "CONNECT" => Method::Connect,
            "DELETE" => Method::Delete,
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "TRACE" => Method::Trace,
            _ => return None,
        })
    }
}

/// The request line plus headers, parsed once headers are complete.
/// Body/cookies are filled in afterward by the connection state machine.
pub struct RequestHead {
    pub method: Method,
    pub url: String,
    pub protocol: &'static str,
    pub path: String,
    pub query: Option<Query>,
    pub headers: Headers,
    /// `None`: no Content-Length header. `Some(n)`: parsed length.
    pub content_length: Option<u64>,
}

/// The fully handler-facing view of a parsed request (spec §3 "Request
/// object").
pub struct Request {
    pub method: Method,
    pub url: String,
    pub protocol: &'static str,
    pub path: String,
    pub query: Option<Query>,
    pub headers: Headers,
    pub body: RequestBody,
}

impl Request {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Parse the `Cookie` request header into a name → value mapping on
    /// demand (spec §4.9 server side).
    pub fn cookies(&self) -> HashMap<String, String> {
        let mut cookies = HashMap::new();
        if let Some(raw) = self.headers.get("cookie") {
            for part in raw.split(';') {
                if let Some(eq) = part.find('=') {
                    let key = part[..eq].trim();
                    if !key.is_empty() {
                        cookies.insert(key.to_string(), part[eq + 1..].trim().to_string());
                    }
                }
            }
        }
        cookies
    }
}

/// Find the first header/body delimiter (`\r\n\r\n` or `\n\n`) in `buf`,
/// returning its start index and total delimiter length.
pub fn find_headers_end(buf: &[u8]) -> Option<(usize, usize)> {
    for (delim, len) in [(b"\r\n\r\n".as_slice(), 4), (b"\n\n".as_slice(), 2)] {
        if let Some(pos) = buf.windows(delim.len()).position(|w| w == delim) {
            return Some((pos, len));
        }
    }
    None
}

/// Parse the request line and headers out of `header_region` (the bytes
/// up to and including the header/body delimiter, delimiter stripped by
/// the caller first via `find_headers_end`). Implements the Open Question
/// decisions: a second `Content-Length` header is rejected with 400, and
/// `Transfer-Encoding: chunked` is rejected with 501.
pub fn parse_head(header_region: &[u8]) -> Result<RequestHead, HttpError> {
    let mut lines = split_lines(header_region);
    if lines.is_empty() {
        return Err(HttpError::protocol(400, "empty request"));
    }
    let request_line = lines.remove(0);
    let (method, url, protocol) = parse_request_line(request_line)?;

    let mut headers = Headers::new();
    let mut seen_content_length = false;
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (key, val) = parse_header_line(line)?;
        if key == "content-length" {
            if seen_content_length {
                return Err(HttpError::protocol(400, "multiple Content-Length headers"));
            }
            seen_content_length = true;
        }
        headers.insert(key, val);
    }

    if protocol == "HTTP/1.1" && !headers.contains_key("host") {
        return Err(HttpError::protocol(400, "Host header is required for HTTP/1.1"));
    }

    if let Some(te) = headers.get("transfer-encoding") {
        if te.eq_ignore_ascii_case("chunked") {
            return Err(HttpError::protocol(501, "chunked request bodies are not supported"));
        }
    }

    let content_length = match headers.get("content-length") {
        None => None,
        Some(v) => Some(
            v.parse::<u64>()
                .map_err(|_| HttpError::protocol(400, format!("wrong content length {v}")))?,
        ),
    };

    let (path, query) = parse_url_path(url.as_bytes())?;

    Ok(RequestHead {
        method,
        url,
        protocol,
        path,
        query,
        headers,
        content_length,
    })
}

fn parse_request_line(line: &[u8]) -> Result<(Method, String, &'static str), HttpError> {
    let line = std::str::from_utf8(line)
        .map_err(|_| HttpError::protocol(400, "request line is not ASCII/UTF-8"))?;
    let mut parts = line.trim_end().splitn(3, ' ');
    let (Some(method_s), Some(url), Some(protocol_s)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::protocol(400, format!("bad request line: {line}")));
    };

    let method = Method::parse(method_s)
        .ok_or_else(|| HttpError::protocol(501, format!("unexpected method {method_s}")))?;
    debug_assert!(is_known_method(method.as_str()));

    let protocol = match protocol_s {
        "HTTP/1.0" => "HTTP/1.0",
        "HTTP/1.1" => "HTTP/1.1",
        other => return Err(HttpError::protocol(505, format!("unexpected protocol {other}"))),
    };
    debug_assert!(is_known_protocol(protocol));

    Ok((method, url.to_string(), protocol))
}

/// Split `\r\n`/`\n`-terminated header bytes into lines, mirroring
/// Python's `bytes.splitlines()` used by the original parser. Also used
/// by the client façade to split a response's status-line-plus-headers
/// region the same way.
pub(crate) fn split_lines(buf: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            let mut end = i;
            if end > start && buf[end - 1] == b'\r' {
                end -= 1;
            }
            lines.push(&buf[start..end]);
            start = i + 1;
        }
        i += 1;
    }
    if start < buf.len() {
        lines.push(&buf[start..]);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_request_line_and_headers() {
        let raw = b"GET /some/path?foo=bar HTTP/1.1\r\nHost: localhost\r\nKeep-Alive: true\r\n";
        let head = parse_head(raw).unwrap();
        assert_eq!(head.method, Method::Get);
        assert_eq!(head.path, "/some/path");
        assert!(head.query.is_some());
        assert_eq!(head.headers.get("host"), Some("localhost"));
        assert_eq!(head.headers.get("keep-alive"), Some("true"));
    }

    #[test]
    fn rejects_unknown_method() {
        let raw = b"FOO / HTTP/1.1\r\nHost: x\r\n";
        let err = parse_head(raw).unwrap_err();
        assert_eq!(err.status(), Some(501));
    }

    #[test]
    fn rejects_unsupported_protocol() {
        let raw = b"GET / HTTP/2.0\r\nHost: x\r\n";
        let err = parse_head(raw).unwrap_err();
        assert_eq!(err.status(), Some(505));
    }

    #[test]
    fn requires_host_for_http11() {
        let raw = b"GET / HTTP/1.1\r\n";
        let err = parse_head(raw).unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn http10_without_host_is_fine() {
        let raw = b"GET / HTTP/1.0\r\n";
        assert!(parse_head(raw).is_ok());
    }

    #[test]
    fn rejects_duplicate_content_length() {
        let raw = b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nContent-Length: 6\r\n";
        let err = parse_head(raw).unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn rejects_chunked_transfer_encoding() {
        let raw = b"POST / HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n";
        let err = parse_head(raw).unwrap_err();
        assert_eq!(err.status(), Some(501));
    }

    #[test]
    fn find_headers_end_accepts_bare_lf() {
        let (pos, len) = find_headers_end(b"GET / HTTP/1.0\n\nbody").unwrap();
        assert_eq!(&b"GET / HTTP/1.0\n\nbody"[..pos], b"GET / HTTP/1.0");
        assert_eq!(len, 2);
    }
}
