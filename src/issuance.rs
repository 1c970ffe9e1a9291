//! Issuing skeleton keys.
//!
//! An operator in a control group asks to be logged in as a target identity. On success a
//! fresh `(series, token)` pair is minted, the token's hash is persisted with the client
//! fingerprint, and the browser receives `<token>.<series>` in a fingerprint-named cookie.
//! Every refusal is a plain `false`; the caller never learns which check failed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audit::SharedSink;
use crate::clock::SharedClock;
use crate::codec::TokenCodec;
use crate::config::SkeletonKeyConfig;
use crate::cookies::{CookieJar, CookieSpec};
use crate::error::{CredentialError, CredentialResult};
use crate::fingerprint::{cookie_name, ClientContext, FingerprintDeriver};
use crate::identity::{Identity, IdentityId, SharedDirectory};
use crate::policy::AuthorizationPolicy;
use crate::storage::{CredentialRecord, SharedCredentialStore};

/// Attempts at finding an unused series before issuance gives up.
pub const SERIES_ATTEMPTS: u32 = 5;

pub struct IssuanceService {
    config: Arc<SkeletonKeyConfig>,
    policy: Arc<AuthorizationPolicy>,
    codec: TokenCodec,
    fingerprints: FingerprintDeriver,
    store: SharedCredentialStore,
    directory: SharedDirectory,
    sink: SharedSink,
    clock: SharedClock,
}

impl IssuanceService {
    pub fn new(
        config: Arc<SkeletonKeyConfig>,
        policy: Arc<AuthorizationPolicy>,
        store: SharedCredentialStore,
        directory: SharedDirectory,
        sink: SharedSink,
        clock: SharedClock,
    ) -> Self {
        let fingerprints = FingerprintDeriver::new(config.fingerprint_salt.clone());
        Self { config, policy, codec: TokenCodec, fingerprints, store, directory, sink, clock }
    }

    /// Mint a skeleton key for `target_id` and set its cookie on `jar`.
    ///
    /// Returns true only when a record exists and its cookie was queued. Once the
    /// requester is known to be allowed, every outcome is reported to the audit sink.
    pub fn issue(&self, requester: &Identity, target_id: IdentityId, client: &ClientContext, jar: &mut dyn CookieJar) -> bool {
        if !self.config.enabled {
            debug!(target: "skeletonkey::issue", "feature disabled; refusing");
            return false;
        }
        if !self.policy.can_initiate(&requester.groups) {
            info!(target: "skeletonkey::issue", requester = %requester.username, "requester is not in a control group");
            return false;
        }

        let Some(target) = self.resolve_target(target_id) else {
            self.sink.login_requested(requester, target_id, None, false);
            return false;
        };
        if !self.policy.can_be_targeted(&target.groups) {
            info!(target: "skeletonkey::issue", requester = %requester.username, target = %target.username, "target may not be logged into");
            self.sink.login_requested(requester, target_id, Some(&target), false);
            return false;
        }

        let created = match self.create_credential(&target, client, jar) {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "skeletonkey::issue", target = %target.username, "issuance failed: {}", e);
                false
            }
        };
        self.sink.login_requested(requester, target_id, Some(&target), created);
        created
    }

    /// Positive id that resolves to exactly that identity.
    fn resolve_target(&self, target_id: IdentityId) -> Option<Identity> {
        if target_id <= 0 { return None; }
        match self.directory.find_by_id(target_id) {
            Ok(found) => found.filter(|t| t.id == target_id),
            Err(e) => {
                warn!(target: "skeletonkey::issue", target_id, "directory lookup failed: {}", e);
                None
            }
        }
    }

    fn create_credential(&self, target: &Identity, client: &ClientContext, jar: &mut dyn CookieJar) -> CredentialResult<()> {
        let fingerprint = self.fingerprints.derive_for(client);
        let token = self.codec.new_token(self.config.key_length)?;
        let token_hash = self.codec.hash(&token)?;
        let expires_at = self.clock.now() + self.config.lifetime();

        let series = self.insert_with_unique_series(|series| CredentialRecord {
            owner: target.username.clone(),
            series,
            fingerprint: fingerprint.clone(),
            token_hash: token_hash.clone(),
            expires_at,
        })?;

        let cookie = CookieSpec::scoped(cookie_name(&fingerprint), TokenCodec::encode_cookie(&token, &series), Some(expires_at), &self.config);
        if let Err(e) = jar.set(cookie) {
            // No cookie means nobody can ever present this record.
            if let Err(del) = self.store.delete_by_series(&series) {
                warn!(target: "skeletonkey::issue", "could not remove orphaned credential: {}", del);
            }
            return Err(e);
        }
        info!(target: "skeletonkey::issue", owner = %target.username, expires_at = %expires_at, "skeleton key issued");
        Ok(())
    }

    /// Pick a series not present in the store and insert the record built for it.
    /// Collisions and lookup failures both use up an attempt.
    fn insert_with_unique_series<F>(&self, build: F) -> CredentialResult<String>
    where
        F: Fn(String) -> CredentialRecord,
    {
        for attempt in 1..=SERIES_ATTEMPTS {
            let series = self.codec.new_series()?;
            match self.store.series_exists(&series) {
                Ok(false) => {}
                Ok(true) => {
                    debug!(target: "skeletonkey::issue", attempt, "series collision");
                    continue;
                }
                Err(e) => {
                    warn!(target: "skeletonkey::issue", attempt, "series lookup failed: {}", e);
                    continue;
                }
            }
            match self.store.insert(build(series.clone())) {
                Ok(()) => return Ok(series),
                Err(CredentialError::DuplicateSeries) => {
                    debug!(target: "skeletonkey::issue", attempt, "series taken between check and insert");
                }
                Err(e) => return Err(e),
            }
        }
        Err(CredentialError::SeriesExhausted(SERIES_ATTEMPTS))
    }
}
