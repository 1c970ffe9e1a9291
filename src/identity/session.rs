use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

use super::principal::Principal;
use crate::error::CredentialResult;
use crate::security::random_session_id;

pub type SessionToken = String;

/// Admin and site sessions live under different cookies, so an operator opening the
/// site as somebody else keeps their own admin session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Realm { Admin, Site }

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionToken,
    pub csrf_token: String,
    pub realm: Realm,
    pub principal: Principal,
    /// Established by a skeleton key rather than by a password.
    pub delegated: bool,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

#[derive(Clone)]
pub struct SessionManager {
    pub ttl: Duration,
    sessions: Arc<RwLock<HashMap<SessionToken, Session>>>,
    user_index: Arc<RwLock<HashMap<String, HashSet<SessionToken>>>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, sessions: Arc::new(RwLock::new(HashMap::new())), user_index: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn issue(&self, realm: Realm, principal: Principal, delegated: bool) -> CredentialResult<Session> {
        let now = Instant::now();
        let sess = Session {
            session_id: random_session_id()?,
            csrf_token: random_session_id()?,
            realm,
            principal,
            delegated,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.write().insert(sess.session_id.clone(), sess.clone());
        self.user_index
            .write()
            .entry(sess.principal.username.to_lowercase())
            .or_default()
            .insert(sess.session_id.clone());
        tracing::debug!(target: "skeletonkey::session", user = %sess.principal.username, realm = ?realm, delegated, ttl_secs = self.ttl.as_secs(), "session.issue");
        Ok(sess)
    }

    /// Live session for `sid` in `realm`; expired sessions are dropped on sight.
    pub fn validate(&self, realm: Realm, sid: &str) -> Option<Session> {
        let now = Instant::now();
        let found = self.sessions.read().get(sid).cloned();
        match found {
            Some(s) if s.expires_at <= now => { self.logout(sid); None }
            Some(s) if s.realm == realm => Some(s),
            _ => None,
        }
    }

    pub fn logout(&self, sid: &str) -> bool {
        let Some(sess) = self.sessions.write().remove(sid) else { return false; };
        let key = sess.principal.username.to_lowercase();
        let mut idx = self.user_index.write();
        if let Some(set) = idx.get_mut(&key) {
            set.remove(sid);
            if set.is_empty() { idx.remove(&key); }
        }
        true
    }

    /// End every session of a user; returns how many were live.
    pub fn revoke_user(&self, username: &str) -> usize {
        let tokens = self.user_index.write().remove(&username.to_lowercase()).unwrap_or_default();
        let mut s = self.sessions.write();
        let count = tokens.iter().filter(|t| s.remove(*t).is_some()).count();
        tracing::info!(target: "skeletonkey::session", user = %username, count, "session.revoke");
        count
    }

    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<SessionToken> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.expires_at <= now)
            .map(|s| s.session_id.clone())
            .collect();
        expired.iter().filter(|sid| self.logout(sid)).count()
    }

    pub fn len(&self) -> usize { self.sessions.read().len() }

    pub fn is_empty(&self) -> bool { self.sessions.read().is_empty() }
}
