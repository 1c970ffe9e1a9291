//! Request-scoped cookie access. The protocol reads and writes cookies through
//! `CookieJar`; the HTTP layer turns whatever was set into `Set-Cookie` headers.

use std::collections::HashMap;

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, TimeZone, Utc};

use crate::config::SkeletonKeyConfig;
use crate::error::{CredentialError, CredentialResult};

/// A cookie to be sent back to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    pub expires: Option<DateTime<Utc>>,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    pub http_only: bool,
}

impl CookieSpec {
    /// Script-inaccessible cookie scoped by the configured path/domain.
    pub fn scoped(name: impl Into<String>, value: impl Into<String>, expires: Option<DateTime<Utc>>, cfg: &SkeletonKeyConfig) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expires,
            path: cfg.cookie_path.clone(),
            domain: cfg.cookie_domain.clone(),
            secure: cfg.force_https,
            http_only: true,
        }
    }

    /// Empty value dated in the past; browsers drop it.
    pub fn removal(name: impl Into<String>, cfg: &SkeletonKeyConfig) -> Self {
        let epoch = Utc.timestamp_opt(1, 0).single();
        Self::scoped(name, "", epoch, cfg)
    }

    pub fn is_removal(&self) -> bool { self.value.is_empty() }

    pub fn to_header_string(&self) -> String {
        let mut s = format!("{}={}", self.name, self.value);
        if let Some(exp) = self.expires {
            s.push_str(&format!("; Expires={}", exp.format("%a, %d %b %Y %H:%M:%S GMT")));
        }
        if !self.path.is_empty() { s.push_str(&format!("; Path={}", self.path)); }
        if !self.domain.is_empty() { s.push_str(&format!("; Domain={}", self.domain)); }
        if self.secure { s.push_str("; Secure"); }
        if self.http_only { s.push_str("; HttpOnly"); }
        s.push_str("; SameSite=Lax");
        s
    }

    pub fn to_header_value(&self) -> CredentialResult<HeaderValue> {
        HeaderValue::from_str(&self.to_header_string()).map_err(|e| CredentialError::Cookie(e.to_string()))
    }
}

pub trait CookieJar {
    fn get(&self, name: &str) -> Option<String>;
    /// Queue a cookie for the response. Later `get` calls see the new value.
    fn set(&mut self, cookie: CookieSpec) -> CredentialResult<()>;
}

/// Cookies of one request plus everything queued for its response.
#[derive(Debug, Clone, Default)]
pub struct RequestCookies {
    current: HashMap<String, String>,
    outgoing: Vec<CookieSpec>,
}

impl RequestCookies {
    pub fn new() -> Self { Self::default() }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut current = HashMap::new();
        for v in headers.get_all(COOKIE).iter() {
            if let Ok(s) = v.to_str() { current.extend(parse_cookie_header(s)); }
        }
        Self { current, outgoing: Vec::new() }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { current: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(), outgoing: Vec::new() }
    }

    pub fn outgoing(&self) -> &[CookieSpec] { &self.outgoing }

    /// Append one `Set-Cookie` header per queued cookie.
    pub fn write_set_cookie(&self, headers: &mut HeaderMap) -> CredentialResult<()> {
        for c in &self.outgoing {
            headers.append(SET_COOKIE, c.to_header_value()?);
        }
        Ok(())
    }
}

impl CookieJar for RequestCookies {
    fn get(&self, name: &str) -> Option<String> { self.current.get(name).cloned() }

    fn set(&mut self, cookie: CookieSpec) -> CredentialResult<()> {
        // Validate now so a broken cookie is reported while the caller can still undo.
        cookie.to_header_value()?;
        if cookie.is_removal() {
            self.current.remove(&cookie.name);
        } else {
            self.current.insert(cookie.name.clone(), cookie.value.clone());
        }
        self.outgoing.retain(|c| c.name != cookie.name);
        self.outgoing.push(cookie);
        Ok(())
    }
}

/// Parse a `Cookie:` header into name/value pairs. Later duplicates win.
pub fn parse_cookie_header(s: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for part in s.split(';') {
        let p = part.trim();
        if let Some((k, v)) = p.split_once('=') {
            let k = k.trim();
            if !k.is_empty() { out.push((k.to_string(), v.trim().to_string())); }
        }
    }
    out
}
