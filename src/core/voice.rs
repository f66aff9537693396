//! Unified voice namespace and catalog
//!
//! Every engine has its own incompatible native voice ids. The catalog
//! aggregates them into a single `engine:nativeId` namespace and resolves
//! incoming identifiers (bare or namespaced) back to `{engine, nativeId}`.
//!
//! Catalogs are built lazily on first use and cached as an immutable snapshot
//! (arc-swap) until explicitly invalidated after engine configuration
//! changes. A single in-flight build is shared between concurrent first
//! callers via the build lock.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::engine::{EngineKind, EngineRegistry};
use crate::errors::{GatewayError, GatewayResult};
use crate::utils::unix_ms;

/// Separator between engine id and native voice id in unified ids
pub const VOICE_NAMESPACE_SEPARATOR: char = ':';

/// A voice in the unified namespace
#[derive(Debug, Clone, Serialize)]
pub struct Voice {
    /// Unified id, `engine:nativeId`, globally unique within a snapshot
    pub id: String,
    pub name: String,
    pub engine: EngineKind,
    pub language: String,
    pub language_code: String,
    pub gender: Option<String>,
    pub description: Option<String>,
    /// Native id used when calling the adapter
    pub native_id: String,
}

/// Outcome of voice resolution: which engine to call, with which native id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVoice {
    pub engine: EngineKind,
    pub native_id: String,
    pub unified_id: String,
}

/// Compose a unified voice id from an engine and a native id
pub fn compose_voice_id(engine: EngineKind, native_id: &str) -> String {
    format!("{}{}{}", engine.as_str(), VOICE_NAMESPACE_SEPARATOR, native_id)
}

/// Split a unified id into its engine and native parts, if namespaced
pub fn split_voice_id(id: &str) -> Option<(EngineKind, &str)> {
    let (engine_part, native_part) = id.split_once(VOICE_NAMESPACE_SEPARATOR)?;
    let engine = EngineKind::parse(engine_part)?;
    if native_part.is_empty() {
        return None;
    }
    Some((engine, native_part))
}

/// Immutable snapshot of the aggregated catalog
pub struct CatalogSnapshot {
    voices: Vec<Voice>,
    index: HashMap<String, usize>,
    pub built_at_ms: u64,
}

impl CatalogSnapshot {
    fn new(voices: Vec<Voice>) -> Self {
        let index = voices
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id.clone(), i))
            .collect();
        Self {
            voices,
            index,
            built_at_ms: unix_ms(),
        }
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn get(&self, unified_id: &str) -> Option<&Voice> {
        self.index.get(unified_id).map(|i| &self.voices[*i])
    }

    pub fn voices_for(&self, engine: EngineKind) -> impl Iterator<Item = &Voice> {
        self.voices.iter().filter(move |v| v.engine == engine)
    }
}

pub struct VoiceCatalog {
    registry: Arc<EngineRegistry>,
    snapshot: ArcSwapOption<CatalogSnapshot>,
    build_lock: tokio::sync::Mutex<()>,
}

impl VoiceCatalog {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self {
            registry,
            snapshot: ArcSwapOption::empty(),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current snapshot, building it on first use.
    ///
    /// Engines that fail to initialize or to list voices are skipped with a
    /// warning; one broken backend never aborts the whole catalog.
    pub async fn snapshot(&self) -> GatewayResult<Arc<CatalogSnapshot>> {
        if let Some(existing) = self.snapshot.load_full() {
            return Ok(existing);
        }

        let _guard = self.build_lock.lock().await;
        // Another caller may have finished the build while we waited.
        if let Some(existing) = self.snapshot.load_full() {
            return Ok(existing);
        }

        let mut voices = Vec::new();
        for kind in self.registry.available_engines() {
            let engine = match self.registry.engine(kind).await {
                Ok(engine) => engine,
                Err(e) => {
                    warn!(engine = %kind, error = %e, "skipping engine during catalog build");
                    continue;
                }
            };
            if !engine.is_available() {
                continue;
            }
            match engine.voices().await {
                Ok(list) => {
                    debug!(engine = %kind, count = list.len(), "engine voices fetched");
                    voices.extend(list.into_iter().map(|v| Voice {
                        id: compose_voice_id(kind, &v.id),
                        name: v.name,
                        engine: kind,
                        language: v.language,
                        language_code: v.language_code,
                        gender: v.gender,
                        description: v.description,
                        native_id: v.id,
                    }));
                }
                Err(e) => {
                    warn!(engine = %kind, error = %e, "voice listing failed, skipping engine");
                }
            }
        }

        let built = Arc::new(CatalogSnapshot::new(voices));
        self.snapshot.store(Some(built.clone()));
        Ok(built)
    }

    /// Drop the cached snapshot; the next caller rebuilds it.
    pub fn invalidate(&self) {
        self.snapshot.store(None);
    }

    /// Resolve an incoming voice identifier, optionally scoped to an engine.
    ///
    /// 1. Namespaced ids (`engine:native`) look up exactly that engine.
    /// 2. A bare id with an engine hint behaves like a namespaced id.
    /// 3. A bare id without a hint scans available engines in declaration
    ///    order and the first match wins.
    pub async fn resolve(
        &self,
        voice_id: &str,
        engine_hint: Option<EngineKind>,
    ) -> GatewayResult<ResolvedVoice> {
        let snapshot = self.snapshot().await?;

        let scoped = match split_voice_id(voice_id) {
            Some((engine, native)) => Some((engine, native.to_string())),
            None => engine_hint.map(|engine| (engine, voice_id.to_string())),
        };

        if let Some((engine, native_id)) = scoped {
            if !self.registry.is_configured(engine) {
                return Err(GatewayError::EngineNotAvailable(engine));
            }
            let unified_id = compose_voice_id(engine, &native_id);
            return match snapshot.get(&unified_id) {
                Some(_) => Ok(ResolvedVoice {
                    engine,
                    native_id,
                    unified_id,
                }),
                None => Err(GatewayError::VoiceNotFound(voice_id.to_string())),
            };
        }

        for engine in self.registry.available_engines() {
            let unified_id = compose_voice_id(engine, voice_id);
            if snapshot.get(&unified_id).is_some() {
                return Ok(ResolvedVoice {
                    engine,
                    native_id: voice_id.to_string(),
                    unified_id,
                });
            }
        }

        Err(GatewayError::VoiceNotFound(voice_id.to_string()))
    }
}
