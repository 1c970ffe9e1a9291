use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{CredentialRecord, CredentialStore, MemoryCredentialStore};
use crate::error::{CredentialError, CredentialResult};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot { version: u32, created_ms: i64, records: Vec<CredentialRecord> }

/// Credential store persisted as a bincode snapshot. Every mutation rewrites the snapshot
/// through a temp file and a rename, so a crash leaves either the old or the new file.
#[derive(Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
    inner: MemoryCredentialStore,
    /// Serializes mutate+save so snapshots are never written out of order.
    write_guard: Arc<Mutex<()>>,
}

fn unavailable<E: std::fmt::Display>(e: E) -> CredentialError { CredentialError::StoreUnavailable(e.to_string()) }

impl FileCredentialStore {
    /// Open (or create) the store at `path`, loading an existing snapshot.
    pub fn open<P: AsRef<Path>>(path: P) -> CredentialResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() { std::fs::create_dir_all(dir).map_err(unavailable)?; }
        let records = if path.exists() {
            let bytes = std::fs::read(&path).map_err(unavailable)?;
            let snap: Snapshot = bincode::deserialize(&bytes).map_err(unavailable)?;
            if snap.version != SNAPSHOT_VERSION {
                return Err(CredentialError::StoreUnavailable(format!("unsupported snapshot version {}", snap.version)));
            }
            snap.records
        } else { Vec::new() };
        tracing::info!(target: "skeletonkey::store", path = %path.display(), records = records.len(), "credential store opened");
        Ok(Self { path, inner: MemoryCredentialStore::from_records(records), write_guard: Arc::new(Mutex::new(())) })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn save_snapshot(&self) -> CredentialResult<()> {
        let created_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0);
        let snap = Snapshot { version: SNAPSHOT_VERSION, created_ms, records: self.inner.records() };
        let bytes = bincode::serialize(&snap).map_err(unavailable)?;
        let tmp = self.path.with_extension("bin.tmp");
        std::fs::write(&tmp, bytes).map_err(unavailable)?;
        std::fs::rename(&tmp, &self.path).map_err(unavailable)?;
        Ok(())
    }

    /// Run a mutation and persist it when it changed anything.
    fn mutate<F: FnOnce(&MemoryCredentialStore) -> CredentialResult<usize>>(&self, f: F) -> CredentialResult<usize> {
        let _g = self.write_guard.lock();
        let changed = f(&self.inner)?;
        if changed > 0 { self.save_snapshot()?; }
        Ok(changed)
    }
}

impl CredentialStore for FileCredentialStore {
    fn purge_expired(&self, now: DateTime<Utc>) -> CredentialResult<usize> { self.mutate(|m| m.purge_expired(now)) }

    fn find_by_series_and_fingerprint(&self, series: &str, fingerprint: &str) -> CredentialResult<Vec<CredentialRecord>> {
        self.inner.find_by_series_and_fingerprint(series, fingerprint)
    }

    fn insert(&self, record: CredentialRecord) -> CredentialResult<()> {
        let _g = self.write_guard.lock();
        let series = record.series.clone();
        self.inner.insert(record)?;
        if let Err(e) = self.save_snapshot() {
            // Not durable means not issued.
            let _ = self.inner.delete_by_series(&series);
            return Err(e);
        }
        Ok(())
    }

    fn delete_by_series(&self, series: &str) -> CredentialResult<usize> { self.mutate(|m| m.delete_by_series(series)) }

    fn delete_all_for_owner(&self, owner: &str) -> CredentialResult<usize> { self.mutate(|m| m.delete_all_for_owner(owner)) }

    fn series_exists(&self, series: &str) -> CredentialResult<bool> { self.inner.series_exists(series) }

    fn delete_all(&self) -> CredentialResult<usize> { self.mutate(|m| m.delete_all()) }

    fn len(&self) -> CredentialResult<usize> { self.inner.len() }
}
