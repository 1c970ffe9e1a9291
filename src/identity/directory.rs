use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::RwLock;

use super::principal::{Identity, IdentityId};
use crate::error::CredentialResult;

/// Read access to the host's user accounts.
pub trait IdentityDirectory: Send + Sync {
    fn find_by_id(&self, id: IdentityId) -> CredentialResult<Option<Identity>>;
    /// Case-insensitive username lookup.
    fn find_by_username(&self, username: &str) -> CredentialResult<Option<Identity>>;
}

pub type SharedDirectory = Arc<dyn IdentityDirectory>;

/// Directory held in memory, optionally loaded from a JSON array of identities.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    identities: Arc<RwLock<Vec<Identity>>>,
}

impl MemoryDirectory {
    pub fn new(identities: Vec<Identity>) -> Self { Self { identities: Arc::new(RwLock::new(identities)) } }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read identity directory: {}", path.display()))?;
        let list: Vec<Identity> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid identity directory JSON: {}", path.display()))?;
        Ok(Self::new(list))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() { std::fs::create_dir_all(dir).ok(); }
        let bytes = serde_json::to_vec_pretty(&*self.identities.read())?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write identity directory: {}", path.display()))?;
        Ok(())
    }

    /// Insert or replace by id.
    pub fn upsert(&self, identity: Identity) {
        let mut g = self.identities.write();
        g.retain(|i| i.id != identity.id);
        g.push(identity);
    }

    pub fn remove(&self, id: IdentityId) -> bool {
        let mut g = self.identities.write();
        let before = g.len();
        g.retain(|i| i.id != id);
        g.len() != before
    }

    pub fn len(&self) -> usize { self.identities.read().len() }

    pub fn is_empty(&self) -> bool { self.identities.read().is_empty() }
}

impl IdentityDirectory for MemoryDirectory {
    fn find_by_id(&self, id: IdentityId) -> CredentialResult<Option<Identity>> {
        Ok(self.identities.read().iter().find(|i| i.id == id).cloned())
    }

    fn find_by_username(&self, username: &str) -> CredentialResult<Option<Identity>> {
        Ok(self.identities.read().iter().find(|i| i.username.eq_ignore_ascii_case(username)).cloned())
    }
}
