//! Engine registry and factory
//!
//! Lazily instantiates adapters, caches one instance per engine id, and
//! injects credentials. Adapter construction failure is never fatal: the
//! failure is surfaced through status and the engine stays selectable so the
//! next call retries construction.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use super::base::{CredentialMap, EngineError, EngineHandle, EngineResult, EngineStatus};
use super::credentials::requires_credentials;
use super::{EngineKind, create_engine};

pub struct EngineRegistry {
    /// One cached instance per engine id, built with system credentials
    engines: DashMap<EngineKind, EngineHandle>,
    /// System-wide default credentials, admin-updatable at runtime
    credentials: RwLock<HashMap<EngineKind, CredentialMap>>,
}

impl EngineRegistry {
    pub fn new(defaults: HashMap<EngineKind, CredentialMap>) -> Self {
        Self {
            engines: DashMap::new(),
            credentials: RwLock::new(defaults),
        }
    }

    /// Current system credentials for an engine (empty map when unset)
    pub fn credentials_for(&self, kind: EngineKind) -> CredentialMap {
        self.credentials.read().get(&kind).cloned().unwrap_or_default()
    }

    /// Replace an engine's system credentials and drop its cached instance so
    /// the next request rebuilds with the new values.
    pub fn set_credentials(&self, kind: EngineKind, credentials: CredentialMap) {
        info!(engine = %kind, "engine credentials updated");
        self.credentials.write().insert(kind, credentials);
        self.engines.remove(&kind);
    }

    /// Whether the engine has what it needs to be listed. Free engines are
    /// always listed; credentialed engines only once defaults exist.
    pub fn is_configured(&self, kind: EngineKind) -> bool {
        if !requires_credentials(kind) {
            return true;
        }
        let creds = self.credentials.read();
        creds
            .get(&kind)
            .map(|c| super::credentials::missing_required(kind, c).is_empty())
            .unwrap_or(false)
    }

    /// Engine ids currently selectable, in resolution-precedence order
    pub fn available_engines(&self) -> Vec<EngineKind> {
        EngineKind::ALL
            .into_iter()
            .filter(|kind| self.is_configured(*kind))
            .collect()
    }

    /// Cached instance for an engine id, if one has been built
    pub fn cached(&self, kind: EngineKind) -> Option<EngineHandle> {
        self.engines.get(&kind).map(|e| e.clone())
    }

    /// Get or build the shared instance for an engine.
    ///
    /// An instance that reports itself unavailable is replaced with a freshly
    /// constructed one — credentials may have appeared since it was built.
    pub async fn engine(&self, kind: EngineKind) -> EngineResult<EngineHandle> {
        if let Some(existing) = self.cached(kind) {
            if existing.is_available() {
                return Ok(existing);
            }
            self.engines.remove(&kind);
        }

        let credentials = self.credentials_for(kind);
        match create_engine(kind, credentials).await {
            Ok(handle) => {
                self.engines.insert(kind, handle.clone());
                Ok(handle)
            }
            Err(e) => {
                warn!(engine = %kind, error = %e, "engine construction failed");
                Err(e)
            }
        }
    }

    /// Build a one-off instance with explicit credentials overriding the
    /// system defaults (used for per-key custom credentials). Never cached:
    /// the shared instance must keep the system credentials.
    pub async fn engine_with_credentials(
        &self,
        kind: EngineKind,
        overrides: Option<&CredentialMap>,
    ) -> EngineResult<EngineHandle> {
        match overrides {
            None => self.engine(kind).await,
            Some(custom) => {
                let mut merged = self.credentials_for(kind);
                for (k, v) in custom {
                    merged.insert(k.clone(), v.clone());
                }
                create_engine(kind, merged).await
            }
        }
    }

    /// Status of every known engine, building instances on demand so the
    /// admin surface always sees a complete list.
    pub async fn statuses(&self) -> Vec<EngineStatus> {
        let mut statuses = Vec::with_capacity(EngineKind::ALL.len());
        for kind in EngineKind::ALL {
            match self.engine(kind).await {
                Ok(handle) => statuses.push(handle.status()),
                Err(e) => statuses.push(EngineStatus {
                    engine: kind,
                    enabled: self.is_configured(kind),
                    available: false,
                    supports_streaming: false,
                    supports_ssml: false,
                    formats: Vec::new(),
                    voice_count: None,
                    last_error: Some(e.to_string()),
                    last_checked_ms: Some(crate::utils::unix_ms()),
                }),
            }
        }
        statuses
    }

    /// Probe an engine's credentials by attempting a voice listing.
    pub async fn test_credentials(
        &self,
        kind: EngineKind,
        credentials: &CredentialMap,
    ) -> EngineResult<usize> {
        let handle = create_engine(kind, credentials.clone()).await?;
        if !handle.is_available() {
            return Err(EngineError::MissingCredentials(format!(
                "engine '{kind}' is not usable with the supplied credentials"
            )));
        }
        let voices = handle.voices().await?;
        Ok(voices.len())
    }
}
