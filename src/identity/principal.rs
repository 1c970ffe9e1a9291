use serde::{Deserialize, Serialize};

pub type IdentityId = i64;
pub type GroupId = u64;

/// A user account as the host directory knows it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Argon2 PHC string of the account password.
    #[serde(default)]
    pub password_hash: String,
    #[serde(default)]
    pub groups: Vec<GroupId>,
    /// Account must reset its credentials before any login, skeleton key included.
    #[serde(default)]
    pub require_reset: bool,
    #[serde(default)]
    pub locale: Option<String>,
}

/// What a session needs to know about the logged-in identity.
///
/// `password_hash` is captured at login time so a later password change invalidates
/// the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: IdentityId,
    pub username: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(default)]
    pub locale: Option<String>,
}

impl From<&Identity> for Principal {
    fn from(i: &Identity) -> Self {
        Self {
            id: i.id,
            username: i.username.clone(),
            name: i.name.clone(),
            email: i.email.clone(),
            password_hash: i.password_hash.clone(),
            locale: i.locale.clone(),
        }
    }
}
