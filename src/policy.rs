//! Group based rules for who may request a skeleton key and who may be logged into.
//!
//! Evaluation is pure: callers hand in the group memberships they already resolved.

use std::collections::HashSet;

use crate::config::SkeletonKeyConfig;
use crate::identity::{GroupId, Identity, IdentityId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    control: HashSet<GroupId>,
    allowed_targets: HashSet<GroupId>,
    disallowed_targets: HashSet<GroupId>,
}

impl AuthorizationPolicy {
    pub fn new<C, A, D>(control: C, allowed_targets: A, disallowed_targets: D) -> Self
    where
        C: IntoIterator<Item = GroupId>,
        A: IntoIterator<Item = GroupId>,
        D: IntoIterator<Item = GroupId>,
    {
        Self {
            control: control.into_iter().collect(),
            allowed_targets: allowed_targets.into_iter().collect(),
            disallowed_targets: disallowed_targets.into_iter().collect(),
        }
    }

    pub fn from_config(cfg: &SkeletonKeyConfig) -> Self {
        Self::new(
            cfg.control_groups.iter().copied(),
            cfg.allowed_target_groups.iter().copied(),
            cfg.disallowed_target_groups.iter().copied(),
        )
    }

    /// True iff `groups` intersects the control groups.
    pub fn can_initiate(&self, groups: &[GroupId]) -> bool {
        groups.iter().any(|g| self.control.contains(g))
    }

    /// True iff `groups` intersects the allowed targets and misses every disallowed one.
    pub fn can_be_targeted(&self, groups: &[GroupId]) -> bool {
        let allowed = groups.iter().any(|g| self.allowed_targets.contains(g));
        let disallowed = groups.iter().any(|g| self.disallowed_targets.contains(g));
        allowed && !disallowed
    }

    /// Ids of the candidates that may be logged into, in input order.
    pub fn eligible_targets<'a, I>(&self, candidates: I) -> Vec<IdentityId>
    where
        I: IntoIterator<Item = &'a Identity>,
    {
        candidates
            .into_iter()
            .filter(|c| self.can_be_targeted(&c.groups))
            .map(|c| c.id)
            .collect()
    }
}
