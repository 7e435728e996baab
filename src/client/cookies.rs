//! Client cookie jar (spec §4.9). Grounded on `uhttp_client.py`'s
//! `_parse_cookies`/`_cookies` dict: deliberately simple (Open Question
//! decision, SPEC_FULL §9) — only the `name=value` portion before the
//! first `;` survives; `Path`/`Domain`/`Expires`/`Max-Age`/`Secure` are
//! discarded.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct CookieJar(HashMap<String, String>);

impl CookieJar {
    pub fn new() -> Self {
        CookieJar(HashMap::new())
    }

    /// Fold one `Set-Cookie` header value into the jar.
    pub fn absorb(&mut self, set_cookie: &str) {
        let cookie_part = set_cookie.split(';').next().unwrap_or(set_cookie);
        if let Some(eq) = cookie_part.find('=') {
            let name = cookie_part[..eq].trim();
            let value = cookie_part[eq + 1..].trim();
            if !name.is_empty() {
                self.0.insert(name.to_string(), value.to_string());
            }
        }
    }

    /// The `Cookie:` request header value, or `None` if the jar is empty.
    pub fn header_value(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        Some(
            self.0
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorbs_name_value_dropping_attributes() {
        let mut jar = CookieJar::new();
        jar.absorb("sid=abc123; Path=/; HttpOnly; Max-Age=600");
        assert_eq!(jar.get("sid"), Some("abc123"));
    }

    #[test]
    fn header_value_joins_multiple_cookies() {
        let mut jar = CookieJar::new();
        jar.absorb("a=1");
        jar.absorb("b=2");
        let header = jar.header_value().unwrap();
        assert!(header.contains("a=1"));
        assert!(header.contains("b=2"));
    }

    #[test]
    fn empty_jar_has_no_header() {
        assert_eq!(CookieJar::new().header_value(), None);
    }
}
