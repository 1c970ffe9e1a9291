use super::*;
use crate::error::CredentialError;
use chrono::Duration;

fn record(owner: &str, series: &str, fingerprint: &str, expires_at: DateTime<Utc>) -> CredentialRecord {
    CredentialRecord {
        owner: owner.to_string(),
        series: series.to_string(),
        fingerprint: fingerprint.to_string(),
        token_hash: "$argon2id$placeholder".to_string(),
        expires_at,
    }
}

fn exercise_store(store: &dyn CredentialStore) {
    let now = Utc::now();
    store.insert(record("alice", "S1", "fpA", now + Duration::minutes(5))).unwrap();
    store.insert(record("alice", "S2", "fpB", now + Duration::minutes(5))).unwrap();
    store.insert(record("bob", "S3", "fpA", now - Duration::seconds(1))).unwrap();

    assert!(matches!(store.insert(record("carol", "S1", "fpC", now)), Err(CredentialError::DuplicateSeries)));
    assert!(store.series_exists("S1").unwrap());
    assert!(!store.series_exists("S9").unwrap());

    // lookup needs both halves of the key
    assert_eq!(store.find_by_series_and_fingerprint("S1", "fpA").unwrap().len(), 1);
    assert!(store.find_by_series_and_fingerprint("S1", "fpB").unwrap().is_empty());

    // expired record is gone after a sweep even though nobody deleted it
    assert_eq!(store.find_by_series_and_fingerprint("S3", "fpA").unwrap().len(), 1);
    assert_eq!(store.purge_expired(now).unwrap(), 1);
    assert!(store.find_by_series_and_fingerprint("S3", "fpA").unwrap().is_empty());

    assert_eq!(store.delete_all_for_owner("alice").unwrap(), 2);
    assert!(store.is_empty().unwrap());
}

#[test]
fn memory_store_contract() {
    exercise_store(&MemoryCredentialStore::new());
}

#[test]
fn file_store_contract() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileCredentialStore::open(tmp.path().join("credentials.bin")).unwrap();
    exercise_store(&store);
}

#[test]
fn purge_keeps_records_expiring_exactly_now() {
    let store = MemoryCredentialStore::new();
    let now = Utc::now();
    store.insert(record("alice", "S1", "fp", now)).unwrap();
    assert_eq!(store.purge_expired(now).unwrap(), 0);
    assert_eq!(store.purge_expired(now + Duration::milliseconds(1)).unwrap(), 1);
}

#[test]
fn find_orders_most_recent_first() {
    // Only reachable through a damaged snapshot, but lookups must still report every match.
    let now = Utc::now();
    let store = MemoryCredentialStore::from_records(vec![
        record("alice", "S1", "fp", now + Duration::minutes(1)),
        record("alice", "S1", "fp", now + Duration::minutes(9)),
    ]);
    let found = store.find_by_series_and_fingerprint("S1", "fp").unwrap();
    assert_eq!(found.len(), 2);
    assert!(found[0].expires_at > found[1].expires_at);
}

#[test]
fn delete_by_series_only_touches_that_series() {
    let store = MemoryCredentialStore::new();
    let exp = Utc::now() + Duration::minutes(1);
    store.insert(record("alice", "S1", "fp", exp)).unwrap();
    store.insert(record("alice", "S2", "fp", exp)).unwrap();
    assert_eq!(store.delete_by_series("S1").unwrap(), 1);
    assert_eq!(store.delete_by_series("S1").unwrap(), 0);
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn file_store_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("nested").join("credentials.bin");
    let exp = Utc::now() + Duration::minutes(10);
    {
        let store = FileCredentialStore::open(&path).unwrap();
        store.insert(record("alice", "S1", "fp", exp)).unwrap();
        store.insert(record("bob", "S2", "fp", exp)).unwrap();
        store.delete_by_series("S2").unwrap();
    }
    let reopened = FileCredentialStore::open(&path).unwrap();
    assert_eq!(reopened.len().unwrap(), 1);
    let found = reopened.find_by_series_and_fingerprint("S1", "fp").unwrap();
    assert_eq!(found[0].owner, "alice");
    assert_eq!(found[0].expires_at, exp);
}

#[test]
fn file_store_rejects_garbage_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("credentials.bin");
    std::fs::write(&path, b"definitely not bincode").unwrap();
    assert!(matches!(FileCredentialStore::open(&path), Err(CredentialError::StoreUnavailable(_))));
}
