//! Basic/Digest authentication (spec §4.8). Grounded on
//! `uhttp_client.py`'s `_build_digest_auth`/`_parse_www_authenticate` for
//! the exact HA1/HA2/cnonce constant derivation and nonce-count
//! formatting — this is the one corner of the spec where the wire
//! format is normative, not just descriptive, so the Rust port follows
//! the Python source byte for byte.

use crate::error::HttpError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::{Digest, Md5};
use std::collections::HashMap;

pub fn basic_auth_header(user: &str, pass: &str) -> String {
    let creds = format!("{user}:{pass}");
    format!("Basic {}", BASE64.encode(creds.as_bytes()))
}

fn md5_hex(data: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(data.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parse a `WWW-Authenticate` challenge (after stripping the leading
/// `Digest `/`Basic ` scheme token) into its directive map.
pub fn parse_www_authenticate(header_value: &str) -> HashMap<String, String> {
    let lower = header_value.to_ascii_lowercase();
    let rest = if lower.starts_with("digest ") {
        &header_value[7..]
    } else if lower.starts_with("basic ") {
        &header_value[6..]
    } else {
        header_value
    };

    let mut result = HashMap::new();
    for part in rest.split(',') {
        let part = part.trim();
        if let Some(eq) = part.find('=') {
            let key = part[..eq].trim().to_ascii_lowercase();
            let mut val = part[eq + 1..].trim();
            if val.starts_with('"') && val.ends_with('"') && val.len() >= 2 {
                val = &val[1..val.len() - 1];
            }
            result.insert(key, val.to_string());
        }
    }
    result
}

/// Digest challenge parameters cached after a `401` so a follow-up
/// request can reuse the realm/nonce/qop without re-challenging (spec
/// §4.8 "On a follow-up successful request, the cached Digest params are
/// reused").
#[derive(Debug, Clone)]
pub struct DigestParams {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub algorithm: String,
    pub opaque: Option<String>,
}

impl DigestParams {
    pub fn from_challenge(directives: &HashMap<String, String>) -> Result<Self, HttpError> {
        let algorithm = directives
            .get("algorithm")
            .map(|a| a.to_ascii_uppercase())
            .unwrap_or_else(|| "MD5".to_string());
        if algorithm != "MD5" && algorithm != "MD5-SESS" {
            return Err(HttpError::UnsupportedAlgorithm(algorithm));
        }
        Ok(DigestParams {
            realm: directives.get("realm").cloned().unwrap_or_default(),
            nonce: directives.get("nonce").cloned().unwrap_or_default(),
            qop: directives.get("qop").cloned(),
            algorithm,
            opaque: directives.get("opaque").cloned(),
        })
    }
}

/// Build the `Authorization: Digest ...` header value for nonce-count
/// `nc` (spec §4.8's HA1/HA2/cnonce/response formulas, byte-for-byte
/// matching `uhttp_client.py::_build_digest_auth`).
pub fn build_digest_auth(
    username: &str,
    password: &str,
    method: &str,
    uri: &str,
    params: &DigestParams,
    nc: u32,
) -> String {
    let cnonce = &md5_hex(&nc.to_string())[..8];

    let mut ha1 = md5_hex(&format!("{username}:{}:{password}", params.realm));
    if params.algorithm == "MD5-SESS" {
        ha1 = md5_hex(&format!("{ha1}:{}:{cnonce}", params.nonce));
    }

    let ha2 = md5_hex(&format!("{method}:{uri}"));
    let nc_str = format!("{nc:08x}");

    let qop_value = params.qop.as_ref().map(|q| q.split(',').next().unwrap_or(q).trim().to_string());
    let response = match &qop_value {
        Some(qop) => md5_hex(&format!("{ha1}:{}:{nc_str}:{cnonce}:{qop}:{ha2}", params.nonce)),
        None => md5_hex(&format!("{ha1}:{}:{ha2}", params.nonce)),
    };

    let mut parts = vec![
        format!(r#"username="{username}""#),
        format!(r#"realm="{}""#, params.realm),
        format!(r#"nonce="{}""#, params.nonce),
        format!(r#"uri="{uri}""#),
        format!(r#"response="{response}""#),
    ];
    if let Some(qop) = &qop_value {
        parts.push(format!("qop={qop}"));
        parts.push(format!("nc={nc_str}"));
        parts.push(format!(r#"cnonce="{cnonce}""#));
    }
    if let Some(opaque) = &params.opaque {
        parts.push(format!(r#"opaque="{opaque}""#));
    }
    if params.algorithm != "MD5" {
        parts.push(format!("algorithm={}", params.algorithm));
    }
    format!("Digest {}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_encodes_user_pass() {
        assert_eq!(basic_auth_header("Aladdin", "open sesame"), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
    }

    #[test]
    fn parses_digest_challenge_directives() {
        let d = parse_www_authenticate(
            r#"Digest realm="R", qop="auth", nonce="N", opaque="O""#,
        );
        assert_eq!(d.get("realm").unwrap(), "R");
        assert_eq!(d.get("qop").unwrap(), "auth");
        assert_eq!(d.get("nonce").unwrap(), "N");
    }

    #[test]
    fn rejects_unsupported_algorithm() {
        let mut directives = HashMap::new();
        directives.insert("algorithm".to_string(), "SHA-256".to_string());
        let err = DigestParams::from_challenge(&directives).unwrap_err();
        assert!(matches!(err, HttpError::UnsupportedAlgorithm(_)));
    }

    /// Spec §8 scenario 6: realm=R, qop=auth, nonce=N, method GET, uri=/,
    /// nc=1 -> response = MD5(MD5(u:R:p):N:00000001:cnonce:auth:MD5(GET:/))
    #[test]
    fn digest_response_matches_reference_formula() {
        let params = DigestParams {
            realm: "R".to_string(),
            nonce: "N".to_string(),
            qop: Some("auth".to_string()),
            algorithm: "MD5".to_string(),
            opaque: None,
        };
        let header = build_digest_auth("u", "p", "GET", "/", &params, 1);

        let cnonce = &md5_hex("1")[..8];
        let ha1 = md5_hex("u:R:p");
        let ha2 = md5_hex("GET:/");
        let expected_response = md5_hex(&format!("{ha1}:N:00000001:{cnonce}:auth:{ha2}"));

        assert!(header.contains(&format!(r#"response="{expected_response}""#)));
        assert!(header.contains("nc=00000001"));
        assert!(header.contains(&format!(r#"cnonce="{cnonce}""#)));
    }
}
