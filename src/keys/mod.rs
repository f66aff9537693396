//! API-key domain
//!
//! [`ApiKey`] is an immutable value type: every mutation is a `with_*`
//! constructor returning a new snapshot, which the repository persists. No
//! shared mutable entity state ever crosses concurrent requests.

mod service;

pub use service::{GeneratedKey, KeyRepository, KeyService, MemoryKeyRepository};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::engine::{CredentialMap, EngineKind};
use crate::utils::unix_ms;

/// Default per-key request limit per rate window
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Per-engine configuration attached to a key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyEngineConfig {
    /// Explicit allow/deny for this engine
    pub enabled: bool,
    /// Only when set are `credentials` used instead of system defaults
    #[serde(default)]
    pub use_custom_credentials: bool,
    #[serde(default)]
    pub credentials: CredentialMap,
}

/// An API key as stored. The plaintext secret never appears here: only its
/// SHA-256 hash and a short suffix for human identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub name: String,
    /// SHA-256 hex digest of the secret
    pub secret_hash: String,
    /// Last 8 characters of the secret, for display only
    pub suffix: String,
    pub is_admin: bool,
    pub active: bool,
    /// Requests allowed per rate window
    pub rate_limit: u32,
    /// Unix ms; `None` means the key never expires
    pub expires_at_ms: Option<u64>,
    pub created_at_ms: u64,
    pub last_used_ms: Option<u64>,
    pub request_count: u64,
    /// Per-engine allow-list and credential overrides, keyed by engine name.
    /// Empty map means default-allow for every engine.
    #[serde(default)]
    pub engines: HashMap<String, KeyEngineConfig>,
}

impl ApiKey {
    pub fn expired(&self) -> bool {
        self.expires_at_ms
            .map(|at| unix_ms() >= at)
            .unwrap_or(false)
    }

    /// Valid means usable for authentication: active and not expired
    pub fn is_valid(&self) -> bool {
        self.active && !self.expired()
    }

    /// Whether this key may use the given engine. Admin keys bypass the
    /// allow-list; keys with no explicit config for an engine default-allow.
    pub fn can_access_engine(&self, engine: EngineKind) -> bool {
        if self.is_admin {
            return true;
        }
        match self.engines.get(engine.as_str()) {
            Some(config) => config.enabled,
            None => true,
        }
    }

    /// Custom credentials for an engine, only when the key explicitly opts
    /// in; otherwise system defaults apply.
    pub fn engine_credentials(&self, engine: EngineKind) -> Option<&CredentialMap> {
        self.engines
            .get(engine.as_str())
            .filter(|c| c.use_custom_credentials)
            .map(|c| &c.credentials)
    }

    // ─────────────────────────────────────────────────────────────────────
    // with-update constructors: each produces a new immutable snapshot
    // ─────────────────────────────────────────────────────────────────────

    pub fn with_name(self, name: String) -> Self {
        Self { name, ..self }
    }

    pub fn with_active(self, active: bool) -> Self {
        Self { active, ..self }
    }

    pub fn with_rate_limit(self, rate_limit: u32) -> Self {
        Self { rate_limit, ..self }
    }

    pub fn with_admin(self, is_admin: bool) -> Self {
        Self { is_admin, ..self }
    }

    pub fn with_expiry(self, expires_at_ms: Option<u64>) -> Self {
        Self { expires_at_ms, ..self }
    }

    pub fn with_engine_config(mut self, engine: EngineKind, config: KeyEngineConfig) -> Self {
        self.engines.insert(engine.as_str().to_string(), config);
        self
    }

    pub fn with_usage_touch(self) -> Self {
        Self {
            last_used_ms: Some(unix_ms()),
            request_count: self.request_count + 1,
            ..self
        }
    }
}
