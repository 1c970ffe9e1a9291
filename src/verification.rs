//! Verifying presented skeleton keys.
//!
//! Runs once per request before the host looks for a session. A credential is consumed by
//! its first presentation whatever the outcome. A matching series with the wrong token
//! means the cookie was copied or the series guessed: every outstanding credential for the
//! owner is revoked and a security event is raised.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audit::SharedSink;
use crate::clock::SharedClock;
use crate::codec::{PresentedCredential, TokenCodec};
use crate::config::SkeletonKeyConfig;
use crate::cookies::{CookieJar, CookieSpec};
use crate::fingerprint::{cookie_name, ClientContext, FingerprintDeriver};
use crate::identity::{Principal, SharedDirectory};
use crate::storage::{CredentialRecord, SharedCredentialStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No skeleton key cookie on this request.
    NoCredential,
    /// Log the browser in as this identity.
    Authenticated(Principal),
    /// A credential was presented and refused. The browser gets a generic failure.
    Rejected,
}

impl Outcome {
    pub fn is_authenticated(&self) -> bool { matches!(self, Outcome::Authenticated(_)) }
}

pub struct VerificationService {
    config: Arc<SkeletonKeyConfig>,
    codec: TokenCodec,
    fingerprints: FingerprintDeriver,
    store: SharedCredentialStore,
    directory: SharedDirectory,
    sink: SharedSink,
    clock: SharedClock,
}

impl VerificationService {
    pub fn new(
        config: Arc<SkeletonKeyConfig>,
        store: SharedCredentialStore,
        directory: SharedDirectory,
        sink: SharedSink,
        clock: SharedClock,
    ) -> Self {
        let fingerprints = FingerprintDeriver::new(config.fingerprint_salt.clone());
        Self { config, codec: TokenCodec, fingerprints, store, directory, sink, clock }
    }

    pub fn verify(&self, client: &ClientContext, jar: &mut dyn CookieJar) -> Outcome {
        let fingerprint = self.fingerprints.derive_for(client);
        let name = cookie_name(&fingerprint);
        let Some(value) = jar.get(&name).filter(|v| !v.is_empty()) else {
            return Outcome::NoCredential;
        };

        if !self.config.enabled {
            debug!(target: "skeletonkey::verify", "feature disabled; discarding presented cookie");
            self.destroy(jar, &name, TokenCodec::decode_cookie(&value).ok().map(|p| p.series).as_deref());
            return Outcome::NoCredential;
        }

        let presented = match TokenCodec::decode_cookie(&value) {
            Ok(p) => p,
            Err(_) => {
                warn!(target: "skeletonkey::verify", "invalid cookie detected");
                self.destroy(jar, &name, None);
                return Outcome::Rejected;
            }
        };

        let now = self.clock.now();
        if let Err(e) = self.store.purge_expired(now) {
            debug!(target: "skeletonkey::verify", "expiry sweep failed: {}", e);
        }

        // Any refused series is deleted, whichever browser presented it.
        let record = match self.lookup(&presented, &fingerprint) {
            Some(r) if !r.is_expired(now) => r,
            _ => {
                self.destroy(jar, &name, Some(&presented.series));
                return Outcome::Rejected;
            }
        };

        if !self.codec.verify(&presented.token, &record.token_hash) {
            self.react_to_theft(&record);
            self.destroy(jar, &name, Some(&presented.series));
            return Outcome::Rejected;
        }

        let owner = match self.directory.find_by_username(&record.owner) {
            Ok(Some(o)) if !o.require_reset => o,
            Ok(Some(_)) => {
                info!(target: "skeletonkey::verify", owner = %record.owner, "owner must reset credentials");
                self.destroy(jar, &name, Some(&presented.series));
                return Outcome::Rejected;
            }
            Ok(None) => {
                info!(target: "skeletonkey::verify", owner = %record.owner, "owner no longer exists");
                self.destroy(jar, &name, Some(&presented.series));
                return Outcome::Rejected;
            }
            Err(e) => {
                warn!(target: "skeletonkey::verify", owner = %record.owner, "directory lookup failed: {}", e);
                self.destroy(jar, &name, Some(&presented.series));
                return Outcome::Rejected;
            }
        };

        // Single use: consumed before the session even exists.
        self.destroy(jar, &name, Some(&presented.series));
        info!(target: "skeletonkey::verify", owner = %owner.username, "skeleton key accepted");
        Outcome::Authenticated(Principal::from(&owner))
    }

    /// Drop any skeleton key cookie (and its record) on this client, e.g. after logout.
    pub fn discard(&self, client: &ClientContext, jar: &mut dyn CookieJar) -> bool {
        let name = cookie_name(&self.fingerprints.derive_for(client));
        let Some(value) = jar.get(&name).filter(|v| !v.is_empty()) else { return false; };
        let series = TokenCodec::decode_cookie(&value).ok().map(|p| p.series);
        self.destroy(jar, &name, series.as_deref());
        true
    }

    /// Exactly one stored match, or nothing.
    fn lookup(&self, presented: &PresentedCredential, fingerprint: &str) -> Option<CredentialRecord> {
        match self.store.find_by_series_and_fingerprint(&presented.series, fingerprint) {
            Ok(mut found) if found.len() == 1 => found.pop(),
            Ok(found) => {
                if found.len() > 1 {
                    warn!(target: "skeletonkey::verify", matches = found.len(), "several credentials share one series");
                    if let Err(e) = self.store.delete_by_series(&presented.series) {
                        debug!(target: "skeletonkey::verify", "could not delete duplicated series: {}", e);
                    }
                }
                None
            }
            Err(e) => {
                warn!(target: "skeletonkey::verify", "credential lookup failed: {}", e);
                None
            }
        }
    }

    fn react_to_theft(&self, record: &CredentialRecord) {
        match self.store.delete_all_for_owner(&record.owner) {
            Ok(n) => warn!(target: "skeletonkey::verify", owner = %record.owner, revoked = n, "token mismatch; revoked all credentials"),
            Err(e) => warn!(target: "skeletonkey::verify", owner = %record.owner, "failed to revoke credentials after token mismatch: {}", e),
        }
        self.sink.security_event(&format!("Skeleton Key login failed for user {}.", record.owner), &record.owner);
    }

    /// Best-effort record delete plus cookie removal.
    fn destroy(&self, jar: &mut dyn CookieJar, name: &str, series: Option<&str>) {
        if let Some(series) = series {
            if let Err(e) = self.store.delete_by_series(series) {
                debug!(target: "skeletonkey::verify", "could not delete credential: {}", e);
            }
        }
        if let Err(e) = jar.set(CookieSpec::removal(name, &self.config)) {
            debug!(target: "skeletonkey::verify", "could not clear cookie: {}", e);
        }
    }
}
