//! Session cookie handling with redacted Debug output.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// An ordered cookie name → value mapping that never exposes values in logs
/// or debug output.
///
/// Cookie values are session credentials: they are what the handshake earns
/// and what the persistent-socket upgrade presents. Unlike an API key they
/// MUST round-trip through serde, because persisting them across process
/// restarts is a feature — redaction therefore applies to `Debug` only.
///
/// Values are zeroized when the set is dropped.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieSet {
    inner: BTreeMap<String, String>,
}

impl CookieSet {
    /// Create an empty cookie set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cookie.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(name.into(), value.into());
    }

    /// Look up a cookie value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(String::as_str)
    }

    /// Number of cookies held (safe to log).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check whether the set holds no cookies.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Copy every cookie from `other` into this set, replacing duplicates.
    pub fn merge(&mut self, other: &CookieSet) {
        for (name, value) in &other.inner {
            self.inner.insert(name.clone(), value.clone());
        }
    }

    /// Absorb a single `Set-Cookie` response header.
    ///
    /// Only the leading `name=value` pair is kept; attributes (`Path`,
    /// `Expires`, ...) are dropped. Headers without a `=` are ignored.
    pub fn absorb_set_cookie(&mut self, header: &str) {
        let pair = header.split(';').next().unwrap_or_default().trim();
        if let Some((name, value)) = pair.split_once('=') {
            if !name.is_empty() {
                self.inner.insert(name.to_string(), value.to_string());
            }
        }
    }

    /// Render the value of a `Cookie` request header.
    ///
    /// # Security Note
    /// The result carries live credentials. Only call this when building an
    /// actual request; never log it.
    pub fn header_value(&self) -> String {
        self.inner
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Debug for CookieSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.inner.keys().map(String::as_str).collect();
        write!(f, "CookieSet({} cookies: {names:?} = [REDACTED])", self.len())
    }
}

impl Drop for CookieSet {
    fn drop(&mut self) {
        for value in self.inner.values_mut() {
            value.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CookieSet;

    #[test]
    fn given_set_cookie_header_when_absorbed_then_attributes_are_dropped() {
        let mut cookies = CookieSet::new();
        cookies.absorb_set_cookie("sid-token=abc123; Path=/; HttpOnly; Secure");

        assert_eq!(cookies.get("sid-token"), Some("abc123"));
        assert_eq!(cookies.len(), 1);
    }

    #[test]
    fn given_malformed_header_when_absorbed_then_ignored() {
        let mut cookies = CookieSet::new();
        cookies.absorb_set_cookie("no-equals-sign-here");
        cookies.absorb_set_cookie("");

        assert!(cookies.is_empty());
    }

    #[test]
    fn given_cookies_when_header_value_then_joined_in_stable_order() {
        let mut cookies = CookieSet::new();
        cookies.insert("b", "2");
        cookies.insert("a", "1");

        assert_eq!(cookies.header_value(), "a=1; b=2");
    }

    #[test]
    fn given_cookies_when_debug_formatted_then_values_are_redacted() {
        let mut cookies = CookieSet::new();
        cookies.insert("session", "super-secret");

        let output = format!("{cookies:?}");
        assert!(output.contains("session"));
        assert!(!output.contains("super-secret"));
        assert!(output.contains("REDACTED"));
    }

    #[test]
    fn given_cookie_set_when_serde_round_trip_then_identical() {
        let mut cookies = CookieSet::new();
        cookies.insert("a", "1");
        cookies.insert("b", "2");

        let json = serde_json::to_string(&cookies).expect("serialize");
        let back: CookieSet = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, cookies);
    }
}
