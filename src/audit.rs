//! Audit notifications: one event per skeleton key request and one per detected
//! credential theft. Sinks are fire-and-forget; they cannot fail the calling flow.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::identity::{Identity, IdentityId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: IdentityId,
    pub username: String,
}

impl From<&Identity> for Actor {
    fn from(i: &Identity) -> Self { Self { id: i.id, username: i.username.clone() } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    /// An operator asked to log in as `target`. `target` is `None` when the requested id
    /// did not resolve to an identity.
    LoginRequested { requester: Actor, target: Option<Actor>, requested_id: IdentityId, succeeded: bool },
    /// A credential was presented with the right series but the wrong token.
    SecurityAlert { message: String, owner: String },
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: AuditEvent);

    fn login_requested(&self, requester: &Identity, requested_id: IdentityId, target: Option<&Identity>, succeeded: bool) {
        self.notify(AuditEvent::LoginRequested {
            requester: requester.into(),
            target: target.map(Actor::from),
            requested_id,
            succeeded,
        });
    }

    fn security_event(&self, message: &str, owner: &str) {
        self.notify(AuditEvent::SecurityAlert { message: message.to_string(), owner: owner.to_string() });
    }
}

pub type SharedSink = Arc<dyn NotificationSink>;

/// Writes audit events to the `skeletonkey::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: AuditEvent) {
        match event {
            AuditEvent::LoginRequested { requester, target, requested_id, succeeded } => {
                let target_name = target.as_ref().map(|t| t.username.as_str()).unwrap_or("<unknown>");
                info!(
                    target: "skeletonkey::audit",
                    asking_username = %requester.username,
                    asking_id = requester.id,
                    requested_username = %target_name,
                    requested_id,
                    succeeded,
                    "skeleton key login request"
                );
            }
            AuditEvent::SecurityAlert { message, owner } => {
                warn!(target: "skeletonkey::audit", owner = %owner, "{}", message);
            }
        }
    }
}

/// Keeps events in memory; useful for tests and for surfacing recent activity.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self { Self::default() }

    pub fn events(&self) -> Vec<AuditEvent> { self.events.lock().clone() }

    pub fn security_alerts(&self) -> usize {
        self.events.lock().iter().filter(|e| matches!(e, AuditEvent::SecurityAlert { .. })).count()
    }

    pub fn clear(&self) { self.events.lock().clear(); }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: AuditEvent) { self.events.lock().push(event); }
}

/// Delivers each event to every inner sink.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<SharedSink>) -> Self { Self { sinks } }
}

impl NotificationSink for FanoutSink {
    fn notify(&self, event: AuditEvent) {
        for s in &self.sinks { s.notify(event.clone()); }
    }
}
