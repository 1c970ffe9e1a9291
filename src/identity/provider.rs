use anyhow::{anyhow, Result};

use super::directory::SharedDirectory;
use super::principal::{Identity, Principal};
use super::session::{Realm, Session, SessionManager};

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub ip: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub session: Session,
    pub identity: Identity,
}

/// Primary (password) authentication for operators. The skeleton key only complements it.
pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse>;
}

pub struct LocalAuthProvider {
    pub directory: SharedDirectory,
    pub sm: SessionManager,
}

impl LocalAuthProvider {
    pub fn new(directory: SharedDirectory, sm: SessionManager) -> Self { Self { directory, sm } }
}

impl AuthProvider for LocalAuthProvider {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse> {
        let identity = self
            .directory
            .find_by_username(&req.username)
            .map_err(|e| anyhow!("auth_lookup_failed: {}", e))?
            .ok_or_else(|| anyhow!("invalid_credentials"))?;
        if identity.require_reset || !crate::security::verify_secret(&identity.password_hash, &req.password) {
            return Err(anyhow!("invalid_credentials"));
        }
        let session = self.sm.issue(Realm::Admin, Principal::from(&identity), false)?;
        tracing::info!(target: "skeletonkey::auth", user = %identity.username, ip = ?req.ip, "auth.login");
        Ok(LoginResponse { session, identity })
    }
}
