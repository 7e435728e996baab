//! Codec utilities shared by the request parser, response encoder and
//! client (spec §4.1). Grounded on `uhttp.py`/`uhttp_server.py`'s
//! `decode_percent_encoding`/`parse_query`/`parse_header_parameters`/
//! `parse_header_line`, generalized from Python's dynamic dict semantics
//! into explicit Rust types.

use crate::error::HttpError;
use std::collections::HashMap;

/// Percent-decode a byte sequence. A `%` followed by two hex digits is
/// replaced by the decoded byte; a `%` that doesn't have two valid hex
/// digits after it (including a truncated trailing escape) is left
/// untouched, along with the rest of the buffer. `+` decodes to a space
/// everywhere else (P4: plus/space duality).
pub fn decode_percent_encoding(data: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'%' {
            if i + 2 < data.len() {
                if let Ok(byte) = u8::from_str_radix(
                    std::str::from_utf8(&data[i + 1..i + 3]).unwrap_or(""),
                    16,
                ) {
                    res.push(byte);
                    i += 3;
                    continue;
                }
            }
            // Truncated or malformed escape: stop decoding, keep the rest
            // verbatim (including the leading '%').
            res.extend_from_slice(&plus_to_space(&data[i..]));
            return res;
        }
        res.push(if data[i] == b'+' { b' ' } else { data[i] });
        i += 1;
    }
    res
}

/// Percent-encode `s` for safe inclusion in a URL path or query
/// component: unreserved characters (`A-Za-z0-9-_.~`) pass through
/// untouched, everything else becomes `%XX`. Used by the client façade
/// to build the `?`-encoded query string (spec §4.7).
pub fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn plus_to_space(data: &[u8]) -> Vec<u8> {
    data.iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect()
}

/// One query-parameter value, following the repeated-key list law (spec
/// §4.1/P5): a bare key maps to `Null`; the first occurrence of a key maps
/// to `One`; a second occurrence upgrades it to a two-element `Many`,
/// further occurrences append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Null,
    One(String),
    Many(Vec<Option<String>>),
}

impl QueryValue {
    fn as_option(&self) -> Option<String> {
        match self {
            QueryValue::Null => None,
            QueryValue::One(s) => Some(s.clone()),
            QueryValue::Many(_) => unreachable!("Many never re-read as scalar"),
        }
    }
}

pub type Query = HashMap<String, QueryValue>;

/// Parse a `k=v&k2=v2` query string into a [`Query`] map, percent-decoding
/// both keys and values. `query` may already hold entries (e.g. from a
/// previous call parsing form-encoded body data onto the same map).
pub fn parse_query(raw: &[u8], query: &mut Query) -> Result<(), HttpError> {
    for part in raw.split(|&b| b == b'&') {
        if part.is_empty() {
            continue;
        }
        let (key_bytes, val) = match part.iter().position(|&b| b == b'=') {
            Some(eq) => {
                let key = decode_percent_encoding(&part[..eq]);
                let val = decode_percent_encoding(&part[eq + 1..]);
                let val = String::from_utf8(val)
                    .map_err(|_| HttpError::protocol(400, "bad query encoding"))?;
                (key, Some(val))
            }
            None => (decode_percent_encoding(part), None),
        };
        let key = String::from_utf8(key_bytes)
            .map_err(|_| HttpError::protocol(400, "bad query encoding"))?;
        insert_query_value(query, key, val);
    }
    Ok(())
}

fn insert_query_value(query: &mut Query, key: String, val: Option<String>) {
    match query.get_mut(&key) {
        None => {
            query.insert(
                key,
                match val {
                    Some(v) => QueryValue::One(v),
                    None => QueryValue::Null,
                },
            );
        }
        Some(QueryValue::Many(list)) => list.push(val),
        Some(existing) => {
            let prev = existing.as_option();
            *existing = QueryValue::Many(vec![prev, val]);
        }
    }
}

/// Parse `path?query` into `(path, query)`. `query` is `None` when there
/// was no `?` in the URL at all (vs. `Some(empty map)` for a trailing `?`
/// with no parameters).
pub fn parse_url_path(url: &[u8]) -> Result<(String, Option<Query>), HttpError> {
    let (path_bytes, query) = match url.iter().position(|&b| b == b'?') {
        Some(idx) => {
            let mut q = Query::new();
            parse_query(&url[idx + 1..], &mut q)?;
            (&url[..idx], Some(q))
        }
        None => (url, None),
    };
    let path = String::from_utf8(decode_percent_encoding(path_bytes))
        .map_err(|_| HttpError::protocol(400, "bad URL path encoding"))?;
    Ok((path, query))
}

/// Parse a `;`-delimited header value into directive name/value pairs,
/// trimming whitespace and stripping one layer of surrounding double
/// quotes from values. Directives without `=` map to `None`.
pub fn parse_header_parameters(value: &str) -> HashMap<String, Option<String>> {
    let mut directives = HashMap::new();
    for part in value.split(';') {
        if let Some(eq) = part.find('=') {
            let key = part[..eq].trim().to_string();
            let val = part[eq + 1..].trim().trim_matches('"').to_string();
            directives.insert(key, Some(val));
        } else if !part.trim().is_empty() {
            directives.insert(part.trim().to_string(), None);
        }
    }
    directives
}

/// Parse one `Key: value` header line into `(lowercase key, trimmed
/// value)`. The line must already be stripped of its trailing CRLF/LF.
pub fn parse_header_line(line: &[u8]) -> Result<(String, String), HttpError> {
    let line = std::str::from_utf8(line)
        .map_err(|_| HttpError::protocol(400, "header line is not ASCII/UTF-8"))?;
    match line.find(':') {
        Some(idx) => Ok((
            line[..idx].trim().to_ascii_lowercase(),
            line[idx + 1..].trim().to_string(),
        )),
        None => Err(HttpError::protocol(400, "wrong header format")),
    }
}

/// An ordered, case-sensitive (already-lowercased by convention) header
/// map. A second `insert` of the same key overwrites the first (spec §9
/// "Header mapping semantics"), but insertion order of distinct keys is
/// preserved, which keeps response encoding deterministic.
#[derive(Debug, Clone, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite a header's value by key (case-insensitive
    /// match against already-stored keys).
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut h = Headers::new();
        for (k, v) in iter {
            h.insert(k, v);
        }
        h
    }
}
