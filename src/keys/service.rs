//! Key lifecycle service and repository interface
//!
//! Persistence engines (file store, Postgres) live outside the core; the
//! service reaches them only through [`KeyRepository`]. The in-memory
//! implementation backs tests and single-process deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::info;
use uuid::Uuid;

use super::{ApiKey, DEFAULT_RATE_LIMIT};
use crate::errors::{GatewayError, GatewayResult};
use crate::utils::unix_ms;

/// Prefix carried by every generated secret
const SECRET_PREFIX: &str = "vg_";

/// A freshly generated key: the plaintext secret exists only in this value
/// and is never recoverable afterwards.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub key: ApiKey,
    pub secret: String,
}

/// Narrow storage interface for keys
#[async_trait]
pub trait KeyRepository: Send + Sync {
    async fn get(&self, id: &str) -> GatewayResult<Option<ApiKey>>;
    async fn find_by_hash(&self, secret_hash: &str) -> GatewayResult<Option<ApiKey>>;
    async fn list(&self) -> GatewayResult<Vec<ApiKey>>;
    /// Insert or replace the snapshot with the given id
    async fn put(&self, key: ApiKey) -> GatewayResult<()>;
    async fn delete(&self, id: &str) -> GatewayResult<bool>;
}

/// In-memory repository
#[derive(Default)]
pub struct MemoryKeyRepository {
    keys: RwLock<HashMap<String, ApiKey>>,
}

#[async_trait]
impl KeyRepository for MemoryKeyRepository {
    async fn get(&self, id: &str) -> GatewayResult<Option<ApiKey>> {
        Ok(self.keys.read().get(id).cloned())
    }

    async fn find_by_hash(&self, secret_hash: &str) -> GatewayResult<Option<ApiKey>> {
        // Constant-time comparison over every stored hash: lookup cost does
        // not leak which key matched.
        let keys = self.keys.read();
        let presented = secret_hash.as_bytes();
        Ok(keys
            .values()
            .find(|k| k.secret_hash.as_bytes().ct_eq(presented).into())
            .cloned())
    }

    async fn list(&self) -> GatewayResult<Vec<ApiKey>> {
        let mut keys: Vec<ApiKey> = self.keys.read().values().cloned().collect();
        keys.sort_by_key(|k| k.created_at_ms);
        Ok(keys)
    }

    async fn put(&self, key: ApiKey) -> GatewayResult<()> {
        self.keys.write().insert(key.id.clone(), key);
        Ok(())
    }

    async fn delete(&self, id: &str) -> GatewayResult<bool> {
        Ok(self.keys.write().remove(id).is_some())
    }
}

/// Key lifecycle and validation service
pub struct KeyService {
    repository: Arc<dyn KeyRepository>,
}

impl KeyService {
    pub fn new(repository: Arc<dyn KeyRepository>) -> Self {
        Self { repository }
    }

    /// SHA-256 hex digest of a presented secret
    pub fn hash_secret(secret: &str) -> String {
        hex::encode(Sha256::digest(secret.as_bytes()))
    }

    /// Generate a new key with a high-entropy random secret. The plaintext is
    /// returned exactly once; only the hash and suffix are stored.
    pub async fn generate(
        &self,
        name: &str,
        is_admin: bool,
        rate_limit: Option<u32>,
        expires_at_ms: Option<u64>,
    ) -> GatewayResult<GeneratedKey> {
        let secret = format!(
            "{SECRET_PREFIX}{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );
        let suffix = secret.chars().skip(secret.chars().count() - 8).collect();

        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            secret_hash: Self::hash_secret(&secret),
            suffix,
            is_admin,
            active: true,
            rate_limit: rate_limit.unwrap_or(DEFAULT_RATE_LIMIT),
            expires_at_ms,
            created_at_ms: unix_ms(),
            last_used_ms: None,
            request_count: 0,
            engines: HashMap::new(),
        };

        self.repository.put(key.clone()).await?;
        info!(key_id = %key.id, name = %key.name, admin = is_admin, "API key created");
        Ok(GeneratedKey { key, secret })
    }

    /// Seed a key whose plaintext is supplied by configuration (bootstrap
    /// admin key). Idempotent across restarts: keyed by the secret hash.
    pub async fn seed_admin(&self, secret: &str) -> GatewayResult<ApiKey> {
        let secret_hash = Self::hash_secret(secret);
        if let Some(existing) = self.repository.find_by_hash(&secret_hash).await? {
            return Ok(existing);
        }

        let suffix = secret
            .chars()
            .rev()
            .take(8)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            name: "bootstrap admin".to_string(),
            secret_hash,
            suffix,
            is_admin: true,
            active: true,
            rate_limit: DEFAULT_RATE_LIMIT,
            expires_at_ms: None,
            created_at_ms: unix_ms(),
            last_used_ms: None,
            request_count: 0,
            engines: HashMap::new(),
        };
        self.repository.put(key.clone()).await?;
        info!(key_id = %key.id, "bootstrap admin key seeded");
        Ok(key)
    }

    /// Validate a presented secret: not found is unauthorized, inactive and
    /// expired keys are forbidden.
    pub async fn authenticate(&self, secret: &str) -> GatewayResult<ApiKey> {
        let hash = Self::hash_secret(secret);
        let key = self
            .repository
            .find_by_hash(&hash)
            .await?
            .ok_or(GatewayError::KeyNotFound)?;

        if !key.active {
            return Err(GatewayError::KeyInactive);
        }
        if key.expired() {
            return Err(GatewayError::KeyExpired);
        }
        Ok(key)
    }

    pub async fn get(&self, id: &str) -> GatewayResult<ApiKey> {
        self.repository
            .get(id)
            .await?
            .ok_or(GatewayError::KeyNotFound)
    }

    pub async fn list(&self) -> GatewayResult<Vec<ApiKey>> {
        self.repository.list().await
    }

    /// Persist an updated snapshot produced by a `with_*` constructor
    pub async fn save(&self, key: ApiKey) -> GatewayResult<ApiKey> {
        self.repository.put(key.clone()).await?;
        Ok(key)
    }

    pub async fn delete(&self, id: &str) -> GatewayResult<()> {
        if !self.repository.delete(id).await? {
            return Err(GatewayError::KeyNotFound);
        }
        info!(key_id = %id, "API key deleted");
        Ok(())
    }

    /// Record one use of the key (last-used timestamp + request counter)
    pub async fn touch(&self, key: &ApiKey) -> GatewayResult<()> {
        self.repository.put(key.clone().with_usage_touch()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> KeyService {
        KeyService::new(Arc::new(MemoryKeyRepository::default()))
    }

    #[tokio::test]
    async fn test_fresh_key_defaults() {
        let service = service();
        let generated = service.generate("ci key", false, None, None).await.unwrap();

        assert!(generated.key.active);
        assert!(!generated.key.is_admin);
        assert_eq!(generated.key.request_count, 0);
        assert_eq!(generated.key.rate_limit, DEFAULT_RATE_LIMIT);
        assert!(generated.secret.starts_with(SECRET_PREFIX));

        // Only hash and suffix persist; the stored entity cannot yield the
        // plaintext.
        let stored = service.get(&generated.key.id).await.unwrap();
        assert_eq!(stored.secret_hash, KeyService::hash_secret(&generated.secret));
        assert_eq!(stored.suffix, &generated.secret[generated.secret.len() - 8..]);
        assert!(!stored.secret_hash.contains(&generated.secret));
    }

    #[tokio::test]
    async fn test_authenticate_round_trip() {
        let service = service();
        let generated = service.generate("k", false, None, None).await.unwrap();

        let authed = service.authenticate(&generated.secret).await.unwrap();
        assert_eq!(authed.id, generated.key.id);

        assert!(matches!(
            service.authenticate("vg_wrong").await,
            Err(GatewayError::KeyNotFound)
        ));
    }

    #[tokio::test]
    async fn test_inactive_and_expired_are_forbidden() {
        let service = service();
        let generated = service.generate("k", false, None, None).await.unwrap();

        service
            .save(generated.key.clone().with_active(false))
            .await
            .unwrap();
        assert!(matches!(
            service.authenticate(&generated.secret).await,
            Err(GatewayError::KeyInactive)
        ));

        service
            .save(generated.key.clone().with_active(true).with_expiry(Some(1)))
            .await
            .unwrap();
        assert!(matches!(
            service.authenticate(&generated.secret).await,
            Err(GatewayError::KeyExpired)
        ));
    }

    #[tokio::test]
    async fn test_seed_admin_is_idempotent() {
        let service = service();
        let first = service.seed_admin("vg_bootstrap_secret").await.unwrap();
        let second = service.seed_admin("vg_bootstrap_secret").await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.is_admin);

        let authed = service.authenticate("vg_bootstrap_secret").await.unwrap();
        assert_eq!(authed.id, first.id);
    }

    #[tokio::test]
    async fn test_touch_increments_request_count() {
        let service = service();
        let generated = service.generate("k", false, None, None).await.unwrap();

        service.touch(&generated.key).await.unwrap();
        let stored = service.get(&generated.key.id).await.unwrap();
        assert_eq!(stored.request_count, 1);
        assert!(stored.last_used_ms.is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_key_errors() {
        let service = service();
        assert!(matches!(
            service.delete("nope").await,
            Err(GatewayError::KeyNotFound)
        ));
    }
}
