//! End-to-end protocol tests: issuance and verification against an in-memory store,
//! driven by a manual clock.

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::*;
use skeletonkey::audit::AuditEvent;
use skeletonkey::clock::Clock;
use skeletonkey::codec::TokenCodec;
use skeletonkey::error::{CredentialError, CredentialResult};
use skeletonkey::fingerprint::{cookie_name, FingerprintDeriver};
use skeletonkey::identity::{IdentityDirectory, MemoryDirectory};
use skeletonkey::storage::{CredentialRecord, CredentialStore};
use skeletonkey::{tprintln, Outcome, SkeletonKey, SkeletonKeyConfig};

#[test]
fn issued_key_logs_in_once() {
    let fx = Fixture::new();
    let mut browser = Browser::new(FIREFOX);
    assert!(browser.issue(&fx, ROOT, JANE));
    assert_eq!(fx.stored(), 1);
    let (_, cookie) = browser.skeleton_cookie().expect("cookie set");

    match browser.verify(&fx) {
        Outcome::Authenticated(p) => {
            assert_eq!(p.username, "jane");
            assert_eq!(p.email, "jane@example.org");
            assert_eq!(p.locale.as_deref(), Some("en-GB"));
            assert!(!p.password_hash.is_empty());
        }
        other => panic!("expected authentication, got {other:?}"),
    }
    assert_eq!(fx.stored(), 0);
    assert!(browser.skeleton_cookie().is_none());
    assert_eq!(browser.verify(&fx), Outcome::NoCredential);

    // Same cookie presented again, e.g. restored from a backup of the jar.
    let name = cookie_name(&FingerprintDeriver::default().derive(ROOT_URL, FIREFOX));
    browser.cookies.insert(name, cookie);
    assert_eq!(browser.verify(&fx), Outcome::Rejected);
    assert!(browser.skeleton_cookie().is_none());
}

#[test]
fn cookie_is_bound_to_the_issuing_browser() {
    let fx = Fixture::new();
    let mut firefox = Browser::new(FIREFOX);
    assert!(firefox.issue(&fx, ROOT, JANE));
    let (name, value) = firefox.skeleton_cookie().expect("cookie set");

    // Copy the cookie verbatim, name included, into another browser.
    let mut chrome = Browser::new(CHROME);
    chrome.cookies.insert(name.clone(), value.clone());
    assert_eq!(chrome.verify(&fx), Outcome::NoCredential);

    // Even filed under the other browser's own cookie name it never authenticates.
    let mut forged = Browser::new(CHROME);
    forged.cookies.insert(cookie_name(&FingerprintDeriver::default().derive(ROOT_URL, CHROME)), value);
    assert_eq!(forged.verify(&fx), Outcome::Rejected);

    // A refused series is gone for good, so the issuing browser cannot use it either.
    assert_eq!(fx.stored(), 0);
    assert_eq!(firefox.verify(&fx), Outcome::Rejected);
    assert!(firefox.skeleton_cookie().is_none());
}

#[test]
fn wrong_token_revokes_every_credential_of_the_owner() {
    let fx = Fixture::new();
    let mut first = Browser::new(FIREFOX);
    let mut second = Browser::new(CHROME);
    let mut unrelated = Browser::new(FIREFOX);
    assert!(first.issue(&fx, ROOT, JANE));
    assert!(second.issue(&fx, OTHER_ADMIN, JANE));
    assert!(unrelated.issue(&fx, ROOT, BOB));
    assert_eq!(fx.stored(), 3);

    let (name, value) = first.skeleton_cookie().expect("cookie");
    let series = TokenCodec::decode_cookie(&value).unwrap().series;
    first.cookies.insert(name, TokenCodec::encode_cookie("NotTheRightTokenAtAll0123456789ab", &series));
    assert_eq!(first.verify(&fx), Outcome::Rejected);

    let left = fx.store.records();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].owner, "bob");
    assert_eq!(second.verify(&fx), Outcome::Rejected);
    assert_eq!(fx.sink.security_alerts(), 1);
    let alert = fx.sink.events().into_iter().find_map(|e| match e {
        AuditEvent::SecurityAlert { message, owner } => Some((message, owner)),
        _ => None,
    });
    assert_eq!(alert, Some(("Skeleton Key login failed for user jane.".to_string(), "jane".to_string())));
}

#[test]
fn replayed_consumed_token_takes_down_the_other_issuance() {
    let fx = Fixture::new();
    let mut victim = Browser::new(FIREFOX);
    let mut other = Browser::new(CHROME);
    assert!(victim.issue(&fx, ROOT, JANE));
    assert!(other.issue(&fx, ROOT, JANE));
    assert_eq!(fx.stored(), 2);

    let (other_name, other_value) = other.skeleton_cookie().expect("cookie");
    let other_series = TokenCodec::decode_cookie(&other_value).unwrap().series;
    let (_, victim_value) = victim.skeleton_cookie().expect("cookie");
    let consumed_token = TokenCodec::decode_cookie(&victim_value).unwrap().token;
    assert!(victim.verify(&fx).is_authenticated());
    assert_eq!(fx.stored(), 1);

    // An attacker who sniffed the victim's token pairs it with the live series.
    other.cookies.insert(other_name, TokenCodec::encode_cookie(&consumed_token, &other_series));
    assert_eq!(other.verify(&fx), Outcome::Rejected);
    assert_eq!(fx.stored(), 0);
    assert_eq!(fx.sink.security_alerts(), 1);
}

#[test]
fn refusals_persist_nothing() {
    let fx = Fixture::new();
    let cases = [
        (JANE, BOB, "requester outside control groups"),
        (NOBODY, JANE, "requester without groups"),
        (ROOT, NOBODY, "target outside allowed groups"),
        (ROOT, BANNED, "target both allowed and disallowed"),
        (ROOT, OTHER_ADMIN, "target is an operator"),
        (ROOT, 999, "unknown target"),
        (ROOT, 0, "zero id"),
    ];
    for (requester, target, why) in cases {
        let mut browser = Browser::new(FIREFOX);
        assert!(!browser.issue(&fx, requester, target), "{why}");
        assert!(browser.skeleton_cookie().is_none(), "{why}");
        assert_eq!(fx.stored(), 0, "{why}");
    }
}

#[test]
fn audit_reports_requests_from_operators_only() {
    let fx = Fixture::new();
    let mut browser = Browser::new(FIREFOX);
    assert!(!browser.issue(&fx, JANE, BOB));
    assert!(fx.sink.events().is_empty());

    assert!(!browser.issue(&fx, ROOT, BANNED));
    assert!(!browser.issue(&fx, ROOT, 999));
    assert!(browser.issue(&fx, ROOT, BOB));
    let outcomes: Vec<(i64, Option<String>, bool)> = fx
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            AuditEvent::LoginRequested { requested_id, target, succeeded, requester } => {
                assert_eq!(requester.username, "root");
                Some((requested_id, target.map(|t| t.username), succeeded))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        outcomes,
        vec![(BANNED, Some("banned".to_string()), false), (999, None, false), (BOB, Some("bob".to_string()), true)]
    );
}

#[test]
fn key_expires_after_its_lifetime() {
    let fx = Fixture::with_config(SkeletonKeyConfig { cookie_lifetime_secs: 10, ..Default::default() });
    let mut browser = Browser::new(FIREFOX);
    assert!(browser.issue(&fx, ROOT, JANE));
    let expires = fx.store.records()[0].expires_at;
    assert_eq!(expires, fx.clock.now() + Duration::seconds(10));

    fx.clock.advance(Duration::seconds(11));
    assert_eq!(browser.verify(&fx), Outcome::Rejected);
    assert_eq!(fx.stored(), 0);
    assert!(browser.skeleton_cookie().is_none());
    assert_eq!(fx.sink.security_alerts(), 0);
}

#[test]
fn key_is_still_valid_at_the_last_second() {
    let fx = Fixture::with_config(SkeletonKeyConfig { cookie_lifetime_secs: 10, ..Default::default() });
    let mut browser = Browser::new(FIREFOX);
    assert!(browser.issue(&fx, ROOT, JANE));
    fx.clock.advance(Duration::seconds(10));
    assert!(browser.verify(&fx).is_authenticated());
}

#[test]
fn sweep_removes_expired_records_without_any_request() {
    let fx = Fixture::new();
    let mut a = Browser::new(FIREFOX);
    let mut b = Browser::new(CHROME);
    assert!(a.issue(&fx, ROOT, JANE));
    fx.clock.advance(Duration::seconds(300));
    assert!(b.issue(&fx, ROOT, BOB));
    fx.clock.advance(Duration::seconds(301));
    assert_eq!(fx.keys.sweep().unwrap(), 1);
    assert_eq!(fx.store.records()[0].owner, "bob");
    assert!(b.verify(&fx).is_authenticated());
}

#[test]
fn malformed_cookies_are_destroyed() {
    let fx = Fixture::new();
    let name = cookie_name(&FingerprintDeriver::default().derive(ROOT_URL, FIREFOX));
    for bad in ["no-separator", ".onlyseries", "onlytoken.", "a.b.c", "tok.ser-ies"] {
        let mut browser = Browser::new(FIREFOX);
        browser.cookies.insert(name.clone(), bad.to_string());
        assert_eq!(browser.verify(&fx), Outcome::Rejected, "{bad}");
        assert!(browser.cookies.is_empty(), "{bad}");
    }
    // An empty value is the same as no cookie.
    let mut browser = Browser::new(FIREFOX);
    browser.cookies.insert(name, String::new());
    assert_eq!(browser.verify(&fx), Outcome::NoCredential);
}

#[test]
fn owner_must_still_be_able_to_log_in() {
    let fx = Fixture::new();
    let mut reset = Browser::new(FIREFOX);
    let mut gone = Browser::new(CHROME);
    assert!(reset.issue(&fx, ROOT, JANE));
    assert!(gone.issue(&fx, ROOT, BOB));

    let mut jane = fx.directory.find_by_id(JANE).unwrap().unwrap();
    jane.require_reset = true;
    fx.directory.upsert(jane);
    assert!(fx.directory.remove(BOB));

    assert_eq!(reset.verify(&fx), Outcome::Rejected);
    assert_eq!(gone.verify(&fx), Outcome::Rejected);
    assert_eq!(fx.stored(), 0);
    assert_eq!(fx.sink.security_alerts(), 0);
}

#[test]
fn reissuing_replaces_the_browser_cookie() {
    let fx = Fixture::new();
    let mut browser = Browser::new(FIREFOX);
    assert!(browser.issue(&fx, ROOT, JANE));
    assert!(browser.issue(&fx, ROOT, BOB));
    assert_eq!(browser.cookies.len(), 1);
    assert_eq!(fx.stored(), 2);
    match browser.verify(&fx) {
        Outcome::Authenticated(p) => assert_eq!(p.username, "bob"),
        other => panic!("expected bob, got {other:?}"),
    }
    // jane's record is orphaned until it expires.
    fx.clock.advance(Duration::seconds(601));
    assert_eq!(fx.keys.sweep().unwrap(), 1);
}

#[test]
fn logout_discards_leftover_key() {
    let fx = Fixture::new();
    let mut browser = Browser::new(FIREFOX);
    assert!(browser.issue(&fx, ROOT, JANE));
    let mut jar = browser.jar();
    assert!(fx.keys.verification().discard(&browser.client, &mut jar));
    browser.absorb(&jar);
    assert!(browser.cookies.is_empty());
    assert_eq!(fx.stored(), 0);
    let mut jar = browser.jar();
    assert!(!fx.keys.verification().discard(&browser.client, &mut jar));
}

#[test]
fn disabled_feature_issues_nothing_and_eats_cookies() {
    let on = Fixture::new();
    let mut browser = Browser::new(FIREFOX);
    assert!(browser.issue(&on, ROOT, JANE));

    let off = SkeletonKey::new(
        SkeletonKeyConfig { enabled: false, ..Default::default() },
        on.store.clone(),
        Arc::new(on.directory.clone()),
        Arc::new(on.sink.clone()),
        Arc::new(on.clock.clone()),
    );
    let mut jar = browser.jar();
    assert!(!off.issuance().issue(&on.identity(ROOT), BOB, &browser.client, &mut jar));
    assert_eq!(off.verification().verify(&browser.client, &mut jar), Outcome::NoCredential);
    browser.absorb(&jar);
    assert!(browser.cookies.is_empty());
    assert_eq!(on.stored(), 0);
}

/// Store whose every operation fails.
struct BrokenStore;

impl CredentialStore for BrokenStore {
    fn purge_expired(&self, _now: DateTime<Utc>) -> CredentialResult<usize> { Err(down()) }
    fn find_by_series_and_fingerprint(&self, _s: &str, _f: &str) -> CredentialResult<Vec<CredentialRecord>> { Err(down()) }
    fn insert(&self, _r: CredentialRecord) -> CredentialResult<()> { Err(down()) }
    fn delete_by_series(&self, _s: &str) -> CredentialResult<usize> { Err(down()) }
    fn delete_all_for_owner(&self, _o: &str) -> CredentialResult<usize> { Err(down()) }
    fn series_exists(&self, _s: &str) -> CredentialResult<bool> { Err(down()) }
    fn delete_all(&self) -> CredentialResult<usize> { Err(down()) }
    fn len(&self) -> CredentialResult<usize> { Err(down()) }
}

fn down() -> CredentialError { CredentialError::StoreUnavailable("connection refused".into()) }

#[test]
fn unavailable_store_fails_closed() {
    let keys = SkeletonKey::new(
        SkeletonKeyConfig::default(),
        Arc::new(BrokenStore),
        Arc::new(MemoryDirectory::new(people())),
        Arc::new(skeletonkey::audit::RecordingSink::new()),
        Arc::new(skeletonkey::clock::ManualClock::starting_now()),
    );
    let root = people().into_iter().find(|p| p.id == ROOT).unwrap();
    let mut browser = Browser::new(FIREFOX);
    let mut jar = browser.jar();
    assert!(!keys.issuance().issue(&root, JANE, &browser.client, &mut jar));
    assert!(jar.outgoing().is_empty());

    let name = cookie_name(&FingerprintDeriver::default().derive(ROOT_URL, FIREFOX));
    browser.cookies.insert(name, "sometoken.SomeSeries".into());
    let mut jar = browser.jar();
    assert_eq!(keys.verification().verify(&browser.client, &mut jar), Outcome::Rejected);
    browser.absorb(&jar);
    assert!(browser.cookies.is_empty());
    tprintln!("broken store outcome checked");
}

/// Store that reports two live records for every series and remembers what it was asked to delete.
#[derive(Default)]
struct DuplicatedStore {
    deleted: parking_lot::Mutex<Vec<String>>,
}

impl CredentialStore for DuplicatedStore {
    fn purge_expired(&self, _now: DateTime<Utc>) -> CredentialResult<usize> { Ok(0) }
    fn find_by_series_and_fingerprint(&self, series: &str, fingerprint: &str) -> CredentialResult<Vec<CredentialRecord>> {
        let record = CredentialRecord {
            owner: "jane".into(),
            series: series.into(),
            fingerprint: fingerprint.into(),
            token_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        Ok(vec![record.clone(), record])
    }
    fn insert(&self, _r: CredentialRecord) -> CredentialResult<()> { Ok(()) }
    fn delete_by_series(&self, series: &str) -> CredentialResult<usize> {
        self.deleted.lock().push(series.to_string());
        Ok(2)
    }
    fn delete_all_for_owner(&self, _o: &str) -> CredentialResult<usize> { Ok(0) }
    fn series_exists(&self, _s: &str) -> CredentialResult<bool> { Ok(true) }
    fn delete_all(&self) -> CredentialResult<usize> { Ok(0) }
    fn len(&self) -> CredentialResult<usize> { Ok(2) }
}

#[test]
fn duplicated_series_is_rejected_and_removed() {
    let store = Arc::new(DuplicatedStore::default());
    let sink = skeletonkey::audit::RecordingSink::new();
    let keys = SkeletonKey::new(
        SkeletonKeyConfig::default(),
        store.clone(),
        Arc::new(MemoryDirectory::new(people())),
        Arc::new(sink.clone()),
        Arc::new(skeletonkey::clock::ManualClock::starting_now()),
    );
    let mut browser = Browser::new(FIREFOX);
    let name = cookie_name(&FingerprintDeriver::default().derive(ROOT_URL, FIREFOX));
    browser.cookies.insert(name, "sometoken.SERIES1".into());

    let mut jar = browser.jar();
    assert_eq!(keys.verification().verify(&browser.client, &mut jar), Outcome::Rejected);
    browser.absorb(&jar);

    assert!(browser.cookies.is_empty());
    assert!(store.deleted.lock().iter().all(|s| s == "SERIES1"));
    assert!(!store.deleted.lock().is_empty());
    // Ambiguity is not treated as theft.
    assert!(sink.events().is_empty());
}

#[test]
fn eligible_targets_for_the_login_menu() {
    let fx = Fixture::new();
    let all: Vec<i64> = people().iter().map(|p| p.id).collect();
    assert_eq!(fx.keys.eligible_targets(&fx.identity(ROOT), &all).unwrap(), vec![JANE, BOB]);
    assert!(fx.keys.eligible_targets(&fx.identity(JANE), &all).unwrap().is_empty());
}
