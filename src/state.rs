//! Shared application state
//!
//! One `AppState` is built at startup and handed to the router as
//! `Arc<AppState>`. All services hang off it; nothing here is a global.

use std::sync::Arc;

use tracing::info;

use crate::config::ServerConfig;
use crate::core::engine::EngineRegistry;
use crate::core::speech::SpeechService;
use crate::core::voice::VoiceCatalog;
use crate::errors::GatewayResult;
use crate::keys::{KeyService, MemoryKeyRepository};
use crate::usage::UsageService;

pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<EngineRegistry>,
    pub catalog: Arc<VoiceCatalog>,
    pub speech: SpeechService,
    pub keys: KeyService,
    pub usage: Arc<UsageService>,
}

impl AppState {
    /// Wire up all services from configuration. Seeds the admin key when one
    /// is configured so the admin surface is reachable on a fresh store.
    pub async fn new(config: ServerConfig) -> GatewayResult<Self> {
        let registry = Arc::new(EngineRegistry::new(config.engine_credentials()));
        let catalog = Arc::new(VoiceCatalog::new(registry.clone()));
        let speech = SpeechService::new(registry.clone(), catalog.clone());
        let keys = KeyService::new(Arc::new(MemoryKeyRepository::default()));
        let usage = Arc::new(UsageService::new());

        if let Some(ref secret) = config.admin_api_key {
            let admin = keys.seed_admin(secret).await?;
            info!(key_id = %admin.id, "admin API key seeded");
        }

        Ok(Self {
            config,
            registry,
            catalog,
            speech,
            keys,
            usage,
        })
    }
}
