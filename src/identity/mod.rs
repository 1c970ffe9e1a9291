//! Identities the skeleton key can act on, and the sessions it hands out.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod directory;
mod session;
mod provider;

pub use principal::{GroupId, Identity, IdentityId, Principal};
pub use directory::{IdentityDirectory, MemoryDirectory, SharedDirectory};
pub use session::{Realm, Session, SessionManager, SessionToken};
pub use provider::{AuthProvider, LocalAuthProvider, LoginRequest, LoginResponse};
