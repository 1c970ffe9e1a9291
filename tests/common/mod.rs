#![allow(dead_code)]
//! Shared fixtures: a small directory of operators and targets, a manual clock, an
//! in-memory store and a browser that keeps whatever cookies the server sets.

use std::collections::HashMap;
use std::sync::Arc;

use skeletonkey::audit::RecordingSink;
use skeletonkey::clock::ManualClock;
use skeletonkey::cookies::RequestCookies;
use skeletonkey::fingerprint::ClientContext;
use skeletonkey::identity::{Identity, IdentityId, MemoryDirectory};
use skeletonkey::storage::MemoryCredentialStore;
use skeletonkey::{Outcome, SkeletonKey, SkeletonKeyConfig};

pub const ROOT_URL: &str = "http://localhost:7878/";
pub const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
pub const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/126.0 Safari/537.36";

pub const ROOT: IdentityId = 1;
pub const OTHER_ADMIN: IdentityId = 2;
pub const JANE: IdentityId = 3;
pub const BANNED: IdentityId = 4;
pub const BOB: IdentityId = 5;
pub const NOBODY: IdentityId = 6;

fn person(id: IdentityId, username: &str, groups: &[u64]) -> Identity {
    Identity {
        id,
        username: username.to_string(),
        name: username.to_uppercase(),
        email: format!("{username}@example.org"),
        password_hash: format!("$argon2id$v=19$m=19456,t=2,p=1$fixture${username}"),
        groups: groups.to_vec(),
        require_reset: false,
        locale: Some("en-GB".to_string()),
    }
}

/// root: control. other_admin: control + registered. jane, bob: registered.
/// banned: registered + disallowed. nobody: no groups.
pub fn people() -> Vec<Identity> {
    vec![
        person(ROOT, "root", &[8]),
        person(OTHER_ADMIN, "other_admin", &[2, 8]),
        person(JANE, "jane", &[2]),
        person(BANNED, "banned", &[2, 7]),
        person(BOB, "bob", &[2]),
        person(NOBODY, "nobody", &[]),
    ]
}

pub struct Fixture {
    pub clock: ManualClock,
    pub store: Arc<MemoryCredentialStore>,
    pub directory: MemoryDirectory,
    pub sink: RecordingSink,
    pub keys: SkeletonKey,
}

impl Fixture {
    pub fn new() -> Self { Self::with_config(SkeletonKeyConfig::default()) }

    pub fn with_config(config: SkeletonKeyConfig) -> Self {
        let clock = ManualClock::starting_now();
        let store = Arc::new(MemoryCredentialStore::new());
        let directory = MemoryDirectory::new(people());
        let sink = RecordingSink::new();
        let keys = SkeletonKey::new(
            config,
            store.clone(),
            Arc::new(directory.clone()),
            Arc::new(sink.clone()),
            Arc::new(clock.clone()),
        );
        Self { clock, store, directory, sink, keys }
    }

    pub fn identity(&self, id: IdentityId) -> Identity {
        people().into_iter().find(|p| p.id == id).unwrap_or_else(|| panic!("no fixture identity {id}"))
    }

    pub fn stored(&self) -> usize { self.store.records().len() }
}

/// A user agent plus its cookie jar, carried across requests.
pub struct Browser {
    pub client: ClientContext,
    pub cookies: HashMap<String, String>,
}

impl Browser {
    pub fn new(user_agent: &str) -> Self {
        Self { client: ClientContext::new(ROOT_URL, user_agent), cookies: HashMap::new() }
    }

    pub fn jar(&self) -> RequestCookies { RequestCookies::from_pairs(self.cookies.clone()) }

    /// Apply the response's Set-Cookie list.
    pub fn absorb(&mut self, jar: &RequestCookies) {
        for c in jar.outgoing() {
            if c.is_removal() {
                self.cookies.remove(&c.name);
            } else {
                self.cookies.insert(c.name.clone(), c.value.clone());
            }
        }
    }

    pub fn issue(&mut self, fx: &Fixture, requester: IdentityId, target: IdentityId) -> bool {
        let mut jar = self.jar();
        let ok = fx.keys.issuance().issue(&fx.identity(requester), target, &self.client, &mut jar);
        self.absorb(&jar);
        ok
    }

    pub fn verify(&mut self, fx: &Fixture) -> Outcome {
        let mut jar = self.jar();
        let outcome = fx.keys.verification().verify(&self.client, &mut jar);
        self.absorb(&jar);
        outcome
    }

    /// The single skeleton key cookie this browser holds, if any.
    pub fn skeleton_cookie(&self) -> Option<(String, String)> {
        self.cookies
            .iter()
            .find(|(k, _)| k.starts_with(skeletonkey::fingerprint::COOKIE_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
    }
}
