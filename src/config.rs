//!
//! skeleton key configuration
//! ---------------------------
//! One immutable settings struct, built once at startup and shared by `Arc` with the
//! authorization policy and both credential services. Values come from defaults, then an
//! optional JSON file, then `SKELETONKEY_*` environment variables.

use std::path::Path;

use anyhow::Context;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{CredentialError, CredentialResult};
use crate::identity::GroupId;

/// Shortest secret we accept; anything below this is trivially brute-forceable.
pub const MIN_KEY_LENGTH: usize = 16;

/// Delegated logins are meant to be consumed within minutes; a day is already generous.
pub const MAX_LIFETIME_SECS: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkeletonKeyConfig {
    /// Master switch. Disabled means no issuance and presented cookies are discarded.
    pub enabled: bool,
    /// Groups whose members may request a skeleton key (default: Super Users).
    pub control_groups: Vec<GroupId>,
    /// Groups whose members may be logged into (default: Registered).
    pub allowed_target_groups: Vec<GroupId>,
    /// Groups that can never be logged into; wins over `allowed_target_groups`
    /// (default: Administrator, Super Users).
    pub disallowed_target_groups: Vec<GroupId>,
    /// Credential lifetime in seconds.
    pub cookie_lifetime_secs: i64,
    /// Length of the one-time token.
    pub key_length: usize,
    pub cookie_path: String,
    pub cookie_domain: String,
    /// Mark cookies `Secure`.
    pub force_https: bool,
    /// Canonical site root; half of every client fingerprint.
    pub site_root_url: String,
    /// Optional deployment secret mixed into fingerprints.
    pub fingerprint_salt: String,
    /// Background sweep period for the HTTP server; 0 disables the ticker.
    pub sweep_interval_secs: u64,
}

impl Default for SkeletonKeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            control_groups: vec![8],
            allowed_target_groups: vec![2],
            disallowed_target_groups: vec![7, 8],
            cookie_lifetime_secs: 600,
            key_length: 32,
            cookie_path: "/".to_string(),
            cookie_domain: String::new(),
            force_https: false,
            site_root_url: "http://localhost:7878/".to_string(),
            fingerprint_salt: String::new(),
            sweep_interval_secs: 30,
        }
    }
}

impl SkeletonKeyConfig {
    pub fn lifetime(&self) -> Duration { Duration::seconds(self.cookie_lifetime_secs) }

    /// Defaults, then the optional JSON file, then process environment; validated.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_overrides(|name| std::env::var(name).ok())
            .context("While applying SKELETONKEY_* environment overrides")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let cfg = serde_json::from_slice::<Self>(&bytes)
            .with_context(|| format!("Invalid JSON in config file: {}", path.display()))?;
        Ok(cfg)
    }

    /// Apply `SKELETONKEY_*` overrides looked up through `get`. Unset names leave the
    /// current value alone; set but unparsable names are an error.
    pub fn apply_overrides<F>(&mut self, get: F) -> CredentialResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("SKELETONKEY_ENABLED") { self.enabled = parse_bool("SKELETONKEY_ENABLED", &v)?; }
        if let Some(v) = get("SKELETONKEY_CONTROL_GROUPS") { self.control_groups = parse_group_list("SKELETONKEY_CONTROL_GROUPS", &v)?; }
        if let Some(v) = get("SKELETONKEY_ALLOWED_TARGET_GROUPS") { self.allowed_target_groups = parse_group_list("SKELETONKEY_ALLOWED_TARGET_GROUPS", &v)?; }
        if let Some(v) = get("SKELETONKEY_DISALLOWED_TARGET_GROUPS") { self.disallowed_target_groups = parse_group_list("SKELETONKEY_DISALLOWED_TARGET_GROUPS", &v)?; }
        if let Some(v) = get("SKELETONKEY_COOKIE_LIFETIME") {
            self.cookie_lifetime_secs = v.trim().parse::<i64>()
                .map_err(|_| CredentialError::Config(format!("SKELETONKEY_COOKIE_LIFETIME: not an integer: {v}")))?;
        }
        if let Some(v) = get("SKELETONKEY_KEY_LENGTH") {
            self.key_length = v.trim().parse::<usize>()
                .map_err(|_| CredentialError::Config(format!("SKELETONKEY_KEY_LENGTH: not an integer: {v}")))?;
        }
        if let Some(v) = get("SKELETONKEY_COOKIE_PATH") { self.cookie_path = v; }
        if let Some(v) = get("SKELETONKEY_COOKIE_DOMAIN") { self.cookie_domain = v; }
        if let Some(v) = get("SKELETONKEY_FORCE_HTTPS") { self.force_https = parse_bool("SKELETONKEY_FORCE_HTTPS", &v)?; }
        if let Some(v) = get("SKELETONKEY_SITE_ROOT") { self.site_root_url = v; }
        if let Some(v) = get("SKELETONKEY_FINGERPRINT_SALT") { self.fingerprint_salt = v; }
        if let Some(v) = get("SKELETONKEY_SWEEP_INTERVAL") {
            self.sweep_interval_secs = v.trim().parse::<u64>()
                .map_err(|_| CredentialError::Config(format!("SKELETONKEY_SWEEP_INTERVAL: not an integer: {v}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> CredentialResult<()> {
        if self.cookie_lifetime_secs <= 0 || self.cookie_lifetime_secs > MAX_LIFETIME_SECS {
            return Err(CredentialError::Config(format!("cookie_lifetime_secs must be in 1..={MAX_LIFETIME_SECS}, got {}", self.cookie_lifetime_secs)));
        }
        if self.key_length < MIN_KEY_LENGTH {
            return Err(CredentialError::Config(format!("key_length must be at least {MIN_KEY_LENGTH}, got {}", self.key_length)));
        }
        if self.site_root_url.trim().is_empty() {
            return Err(CredentialError::Config("site_root_url must not be empty".into()));
        }
        if self.control_groups.is_empty() {
            tracing::warn!(target: "startup", "no control groups configured; nobody can request a skeleton key");
        }
        Ok(())
    }
}

fn parse_bool(name: &str, v: &str) -> CredentialResult<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CredentialError::Config(format!("{name}: not a boolean: {v}"))),
    }
}

/// Comma separated group ids, e.g. `"7, 8"`. Empty entries are skipped.
fn parse_group_list(name: &str, v: &str) -> CredentialResult<Vec<GroupId>> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<GroupId>().map_err(|_| CredentialError::Config(format!("{name}: bad group id '{s}'"))))
        .collect()
}
