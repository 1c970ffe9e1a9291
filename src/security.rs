//! Secret primitives shared by the token codec and the operator login: Argon2 PHC
//! hashing, verification and CSPRNG-backed random strings.

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};

use crate::error::{CredentialError, CredentialResult};

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Hash a secret into an Argon2 PHC string with a fresh random salt.
pub fn hash_secret(secret: &str) -> CredentialResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| CredentialError::Random(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| CredentialError::Hashing(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| CredentialError::Hashing(e.to_string()))?
        .to_string();
    Ok(phc)
}

/// Verify `secret` against a PHC string. Unparsable hashes never verify.
pub fn verify_secret(hash: &str, secret: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(secret.as_bytes(), &parsed).is_ok()
    } else { false }
}

/// `len` characters drawn uniformly from `[A-Za-z0-9]`.
pub fn random_alphanumeric(len: usize) -> CredentialResult<String> {
    // Reject bytes >= 248 (= 62 * 4) so the modulo below is unbiased.
    const LIMIT: u8 = 248;
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];
    while out.len() < len {
        getrandom::getrandom(&mut buf).map_err(|e| CredentialError::Random(e.to_string()))?;
        for b in buf.iter().copied().filter(|b| *b < LIMIT) {
            if out.len() == len { break; }
            out.push(ALPHANUMERIC[(b as usize) % ALPHANUMERIC.len()] as char);
        }
    }
    Ok(out)
}

/// Random id for operator/site sessions and CSRF tokens (URL safe, no padding).
pub fn random_session_id() -> CredentialResult<String> {
    use base64::Engine;
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| CredentialError::Random(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}
