//! Two-part credential values: a random series naming the credential slot and a
//! one-time token that is only ever stored hashed. The cookie carries
//! `<token>.<series>`.

use crate::error::{CredentialError, CredentialResult};
use crate::security;

pub const SERIES_LENGTH: usize = 20;
pub const DEFAULT_TOKEN_LENGTH: usize = 32;
pub const COOKIE_SEPARATOR: char = '.';

/// A decoded cookie value, as presented by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedCredential {
    pub token: String,
    pub series: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCodec;

impl TokenCodec {
    pub fn new_series(&self) -> CredentialResult<String> { security::random_alphanumeric(SERIES_LENGTH) }

    pub fn new_token(&self, length: usize) -> CredentialResult<String> { security::random_alphanumeric(length) }

    pub fn hash(&self, token: &str) -> CredentialResult<String> { security::hash_secret(token) }

    pub fn verify(&self, token: &str, token_hash: &str) -> bool { security::verify_secret(token_hash, token) }

    pub fn encode_cookie(token: &str, series: &str) -> String {
        format!("{token}{COOKIE_SEPARATOR}{series}")
    }

    /// Split a cookie value back into token and series.
    ///
    /// Exactly one separator, both halves non-empty, series alphanumeric. The series ends up
    /// in store lookups so nothing else is let through.
    pub fn decode_cookie(value: &str) -> CredentialResult<PresentedCredential> {
        let mut parts = value.split(COOKIE_SEPARATOR);
        let (Some(token), Some(series), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CredentialError::MalformedCredential);
        };
        if token.is_empty() || series.is_empty() || !series.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CredentialError::MalformedCredential);
        }
        Ok(PresentedCredential { token: token.to_string(), series: series.to_string() })
    }
}
