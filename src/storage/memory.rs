use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{CredentialRecord, CredentialStore};
use crate::error::{CredentialError, CredentialResult};

/// In-process credential store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    records: Arc<RwLock<Vec<CredentialRecord>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self { Self::default() }

    pub(crate) fn from_records(records: Vec<CredentialRecord>) -> Self {
        Self { records: Arc::new(RwLock::new(records)) }
    }

    /// Copy of every record, for snapshots and inspection.
    pub fn records(&self) -> Vec<CredentialRecord> { self.records.read().clone() }

    fn remove_where<F: Fn(&CredentialRecord) -> bool>(&self, pred: F) -> usize {
        let mut g = self.records.write();
        let before = g.len();
        g.retain(|r| !pred(r));
        before - g.len()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn purge_expired(&self, now: DateTime<Utc>) -> CredentialResult<usize> {
        let removed = self.remove_where(|r| r.is_expired(now));
        if removed > 0 { tracing::debug!(target: "skeletonkey::store", removed, "purged expired credentials"); }
        Ok(removed)
    }

    fn find_by_series_and_fingerprint(&self, series: &str, fingerprint: &str) -> CredentialResult<Vec<CredentialRecord>> {
        let mut found: Vec<CredentialRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| r.series == series && r.fingerprint == fingerprint)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.expires_at.cmp(&a.expires_at));
        Ok(found)
    }

    fn insert(&self, record: CredentialRecord) -> CredentialResult<()> {
        let mut g = self.records.write();
        if g.iter().any(|r| r.series == record.series) {
            return Err(CredentialError::DuplicateSeries);
        }
        g.push(record);
        Ok(())
    }

    fn delete_by_series(&self, series: &str) -> CredentialResult<usize> { Ok(self.remove_where(|r| r.series == series)) }

    fn delete_all_for_owner(&self, owner: &str) -> CredentialResult<usize> { Ok(self.remove_where(|r| r.owner == owner)) }

    fn series_exists(&self, series: &str) -> CredentialResult<bool> { Ok(self.records.read().iter().any(|r| r.series == series)) }

    fn delete_all(&self) -> CredentialResult<usize> {
        let mut g = self.records.write();
        let n = g.len();
        g.clear();
        Ok(n)
    }

    fn len(&self) -> CredentialResult<usize> { Ok(self.records.read().len()) }
}
