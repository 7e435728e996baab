//! Dynamic body → wire encoding and wire → typed decoding, modeled as
//! tagged variants rather than runtime type inspection (spec §9 design
//! note). `Body` is what a handler hands to `respond()`; `RequestBody` is
//! what the parser hands back after decoding an incoming request.

use crate::codec::{Headers, Query, parse_query};
use crate::error::HttpError;
use serde_json::Value as Json;

pub const CONTENT_TYPE: &str = "content-type";
pub const CONTENT_LENGTH: &str = "content-length";
pub const CONTENT_TYPE_XFORMDATA: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_HTML_UTF8: &str = "text/html; charset=UTF-8";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Body a handler constructs a response from (spec §4.1 "Response body
/// auto-encoding"). The constructor choice at the call site replaces the
/// dynamic `isinstance` dispatch the original implementation uses. Also
/// reused client-side to encode outgoing request bodies (spec §4.7
/// "encode body per §4.1"); `Clone` lets the client façade rebuild the
/// same request frame on a Digest-auth retry.
#[derive(Clone)]
pub enum Body {
    /// Serialized to JSON, `application/json` by default.
    Json(Json),
    /// UTF-8 encoded, `text/html; charset=UTF-8` by default.
    Text(String),
    /// Sent as-is, `application/octet-stream` by default.
    Bytes(Vec<u8>),
    /// No body at all; no Content-Type is set.
    Empty,
}

impl Body {
    /// Encode the body to wire bytes, setting `Content-Type` and
    /// `Content-Length` on `headers` if the caller hasn't already.
    /// Content-Length is always written, even for an empty body.
    pub fn encode(self, headers: &mut Headers) -> Result<Vec<u8>, HttpError> {
        let bytes = match self {
            Body::Json(v) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, CONTENT_TYPE_JSON);
                }
                serde_json::to_vec(&v)
                    .map_err(|e| HttpError::protocol(500, format!("JSON encode: {e}")))?
            }
            Body::Text(s) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, CONTENT_TYPE_HTML_UTF8);
                }
                s.into_bytes()
            }
            Body::Bytes(b) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, CONTENT_TYPE_OCTET_STREAM);
                }
                b
            }
            Body::Empty => Vec::new(),
        };
        headers.insert(CONTENT_LENGTH, bytes.len().to_string());
        Ok(bytes)
    }
}

impl From<Json> for Body {
    fn from(v: Json) -> Self {
        Body::Json(v)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Bytes(b)
    }
}

/// A decoded incoming request body (spec §9 design note), produced by the
/// request parser from the raw bytes plus the `Content-Type` directives.
pub enum RequestBody {
    /// `application/x-www-form-urlencoded`, decoded via query parsing.
    Form(Query),
    /// `application/json`.
    Json(Json),
    /// Anything else: raw undecoded bytes.
    Bytes(Vec<u8>),
    /// No body was present (absent or zero-length Content-Length).
    Empty,
}

impl RequestBody {
    pub fn decode(
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<RequestBody, HttpError> {
        if data.is_empty() {
            return Ok(RequestBody::Empty);
        }
        let directives = crate::codec::parse_header_parameters(content_type);
        if directives.contains_key(CONTENT_TYPE_XFORMDATA) {
            let mut q = Query::new();
            parse_query(&data, &mut q)?;
            Ok(RequestBody::Form(q))
        } else if directives.contains_key(CONTENT_TYPE_JSON) {
            let v: Json = serde_json::from_slice(&data)
                .map_err(|e| HttpError::protocol(400, format!("JSON decode: {e}")))?;
            Ok(RequestBody::Json(v))
        } else {
            Ok(RequestBody::Bytes(data))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RequestBody::Bytes(b) => b,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_sets_content_type_and_length() {
        let mut headers = Headers::new();
        let bytes = Body::Json(serde_json::json!({"ok": true}))
            .encode(&mut headers)
            .unwrap();
        assert_eq!(headers.get(CONTENT_TYPE), Some(CONTENT_TYPE_JSON));
        assert_eq!(
            headers.get(CONTENT_LENGTH),
            Some(bytes.len().to_string().as_str())
        );
        assert!(bytes.ends_with(b"}"));
    }

    #[test]
    fn form_body_decodes_to_query() {
        let body = RequestBody::decode(CONTENT_TYPE_XFORMDATA, b"a=1&a=2".to_vec()).unwrap();
        match body {
            RequestBody::Form(q) => assert_eq!(q.len(), 1),
            _ => panic!("expected form body"),
        }
    }

    #[test]
    fn unrecognized_content_type_is_raw_bytes() {
        let body = RequestBody::decode("application/octet-stream", b"\x00\x01".to_vec()).unwrap();
        assert_eq!(body.as_bytes(), &[0, 1]);
    }
}
