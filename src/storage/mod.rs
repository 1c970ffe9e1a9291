//!
//! skeleton key credential storage
//! --------------------------------
//! Outstanding delegated-login credentials, one `CredentialRecord` per issued cookie.
//! The store is the only shared mutable state of the protocol: issuance writes, verification
//! reads and deletes, and the expiry sweep reclaims whatever nobody consumed.
//!
//! Two backends implement `CredentialStore`:
//! - `MemoryCredentialStore`: a lock-guarded record list, lost on restart.
//! - `FileCredentialStore`: the same list, snapshotted to disk with bincode after every
//!   mutation so outstanding credentials survive a restart.
//!
//! Store methods are plain synchronous calls; no lock is held across them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CredentialResult;

mod memory;
mod file;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

/// A persisted credential. The plaintext token never reaches this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Username of the identity this credential logs into.
    pub owner: String,
    pub series: String,
    pub fingerprint: String,
    /// Argon2 PHC string of the token.
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { self.expires_at < now }
}

pub trait CredentialStore: Send + Sync {
    /// Delete every record with `expires_at < now`; returns how many went.
    fn purge_expired(&self, now: DateTime<Utc>) -> CredentialResult<usize>;

    /// All records for the pair, most recent expiry first. More than one is an anomaly the
    /// caller must treat as failure.
    fn find_by_series_and_fingerprint(&self, series: &str, fingerprint: &str) -> CredentialResult<Vec<CredentialRecord>>;

    /// Fails with `DuplicateSeries` if the series is already taken.
    fn insert(&self, record: CredentialRecord) -> CredentialResult<()>;

    fn delete_by_series(&self, series: &str) -> CredentialResult<usize>;

    /// Theft reaction: revoke the owner's whole credential lineage.
    fn delete_all_for_owner(&self, owner: &str) -> CredentialResult<usize>;

    fn series_exists(&self, series: &str) -> CredentialResult<bool>;

    fn delete_all(&self) -> CredentialResult<usize>;

    fn len(&self) -> CredentialResult<usize>;

    fn is_empty(&self) -> CredentialResult<bool> { Ok(self.len()? == 0) }
}

pub type SharedCredentialStore = Arc<dyn CredentialStore>;

#[cfg(test)]
#[path = "storage_tests.rs"]
mod storage_tests;
