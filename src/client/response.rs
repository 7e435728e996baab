//! `HttpResponse` (spec §3 "HttpResponse (client-side)"): immutable,
//! with a lazily-parsed JSON cache. Grounded on `uhttp_client.py`'s
//! `HttpResponse` class.

use crate::codec::Headers;
use crate::error::HttpError;
use serde_json::Value as Json;
use std::cell::OnceCell;

pub struct HttpResponse {
    status: u16,
    status_message: String,
    headers: Headers,
    body: Vec<u8>,
    json: OnceCell<Json>,
}

impl HttpResponse {
    pub fn new(status: u16, status_message: String, headers: Headers, body: Vec<u8>) -> Self {
        HttpResponse {
            status,
            status_message,
            headers,
            body,
            json: OnceCell::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON, lazily and cached (spec: "lazy JSON
    /// cache").
    pub fn json(&self) -> Result<&Json, HttpError> {
        if let Some(v) = self.json.get() {
            return Ok(v);
        }
        let parsed: Json = serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::ResponseError(format!("JSON decode error: {e}")))?;
        Ok(self.json.get_or_init(|| parsed))
    }
}
