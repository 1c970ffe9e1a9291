//! Client fingerprints: SHA-256 over the site root and the browser's user agent.
//!
//! The fingerprint names the cookie and is stored with the credential, so a cookie lifted
//! into another browser (different user agent) never matches. It is not a secret.

use sha2::{Digest, Sha256};

pub const COOKIE_PREFIX: &str = "skeletonkey_";

/// What the server knows about the requesting browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub root_url: String,
    pub user_agent: String,
}

impl ClientContext {
    pub fn new(root_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self { root_url: root_url.into(), user_agent: user_agent.into() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FingerprintDeriver {
    salt: String,
}

impl FingerprintDeriver {
    pub fn new(salt: impl Into<String>) -> Self { Self { salt: salt.into() } }

    pub fn derive(&self, root_url: &str, user_agent: &str) -> String {
        let mut h = Sha256::new();
        h.update(self.salt.as_bytes());
        h.update(root_url.as_bytes());
        h.update(user_agent.as_bytes());
        hex::encode(h.finalize())
    }

    pub fn derive_for(&self, client: &ClientContext) -> String { self.derive(&client.root_url, &client.user_agent) }
}

pub fn cookie_name(fingerprint: &str) -> String { format!("{COOKIE_PREFIX}{fingerprint}") }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_and_context_sensitive() {
        let d = FingerprintDeriver::default();
        let a = d.derive("https://example.org/", "Firefox");
        assert_eq!(a, d.derive("https://example.org/", "Firefox"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, d.derive("https://example.org/", "Chrome"));
        assert_ne!(a, d.derive("https://example.com/", "Firefox"));
    }

    #[test]
    fn salt_changes_fingerprint() {
        let plain = FingerprintDeriver::default().derive("https://example.org/", "Firefox");
        let salted = FingerprintDeriver::new("s3cret").derive("https://example.org/", "Firefox");
        assert_ne!(plain, salted);
    }

    #[test]
    fn cookie_name_embeds_fingerprint() {
        let d = FingerprintDeriver::default();
        let ctx = ClientContext::new("https://example.org/", "Firefox");
        let fp = d.derive_for(&ctx);
        assert_eq!(cookie_name(&fp), format!("skeletonkey_{fp}"));
    }
}
