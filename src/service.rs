//! SkeletonKey facade
//! ------------------
//! Wires configuration, policy, storage, directory, audit sink and clock into the issuance
//! and verification services, and owns the maintenance entry points (startup, sweeping).

use std::sync::Arc;

use tracing::{debug, info};

use crate::audit::{SharedSink, TracingSink};
use crate::clock::{SharedClock, SystemClock};
use crate::config::SkeletonKeyConfig;
use crate::error::CredentialResult;
use crate::fingerprint::ClientContext;
use crate::identity::{Identity, IdentityId, SharedDirectory};
use crate::issuance::IssuanceService;
use crate::policy::AuthorizationPolicy;
use crate::storage::SharedCredentialStore;
use crate::verification::VerificationService;

pub struct SkeletonKey {
    config: Arc<SkeletonKeyConfig>,
    policy: Arc<AuthorizationPolicy>,
    store: SharedCredentialStore,
    directory: SharedDirectory,
    clock: SharedClock,
    issuance: IssuanceService,
    verification: VerificationService,
}

impl SkeletonKey {
    pub fn new(
        config: SkeletonKeyConfig,
        store: SharedCredentialStore,
        directory: SharedDirectory,
        sink: SharedSink,
        clock: SharedClock,
    ) -> Self {
        let config = Arc::new(config);
        let policy = Arc::new(AuthorizationPolicy::from_config(&config));
        let issuance = IssuanceService::new(
            config.clone(),
            policy.clone(),
            store.clone(),
            directory.clone(),
            sink.clone(),
            clock.clone(),
        );
        let verification = VerificationService::new(config.clone(), store.clone(), directory.clone(), sink, clock.clone());
        Self { config, policy, store, directory, clock, issuance, verification }
    }

    /// Wall clock and tracing audit.
    pub fn with_defaults(config: SkeletonKeyConfig, store: SharedCredentialStore, directory: SharedDirectory) -> Self {
        Self::new(config, store, directory, Arc::new(TracingSink), Arc::new(SystemClock))
    }

    /// Run once before serving. With the feature switched off nothing issued earlier may
    /// stay usable, so the store is emptied.
    pub fn startup(&self) -> CredentialResult<usize> {
        if self.config.enabled {
            let n = self.store.purge_expired(self.clock.now())?;
            debug!(target: "skeletonkey::service", purged = n, "startup sweep");
            return Ok(n);
        }
        let n = self.store.delete_all()?;
        info!(target: "skeletonkey::service", removed = n, "skeleton key disabled; outstanding credentials removed");
        Ok(n)
    }

    /// Drop expired credentials. Called periodically by the server.
    pub fn sweep(&self) -> CredentialResult<usize> { self.store.purge_expired(self.clock.now()) }

    pub fn issuance(&self) -> &IssuanceService { &self.issuance }
    pub fn verification(&self) -> &VerificationService { &self.verification }
    pub fn policy(&self) -> &AuthorizationPolicy { &self.policy }
    pub fn config(&self) -> &SkeletonKeyConfig { &self.config }

    pub fn client_context(&self, user_agent: &str) -> ClientContext {
        ClientContext::new(self.config.site_root_url.clone(), user_agent)
    }

    /// Which of `candidates` the requester could log into. Empty for non-operators and when
    /// the feature is off; unknown ids are skipped.
    pub fn eligible_targets(&self, requester: &Identity, candidates: &[IdentityId]) -> CredentialResult<Vec<IdentityId>> {
        if !self.config.enabled || !self.policy.can_initiate(&requester.groups) {
            return Ok(Vec::new());
        }
        let mut found = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some(identity) = self.directory.find_by_id(*id)? {
                found.push(identity);
            }
        }
        Ok(self.policy.eligible_targets(found.iter()))
    }
}
