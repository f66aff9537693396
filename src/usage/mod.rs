//! Per-key rate limiting and usage accounting
//!
//! Rate limiting is a fixed window per key id: the first request in a window
//! stores the window start, subsequent requests increment the counter, and a
//! counter at the key's limit rejects with the seconds left in the window.
//! Usage records are an in-memory ring capped at a fixed size.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::engine::EngineKind;
use crate::errors::{GatewayError, GatewayResult};
use crate::keys::ApiKey;
use crate::utils::unix_ms;

/// Rate-limit window length
pub const WINDOW_MS: u64 = 60_000;
/// Maximum retained usage records
pub const MAX_RECORDS: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub key_id: String,
    pub engine: EngineKind,
    pub voice: String,
    pub path: String,
    pub status: u16,
    pub characters: usize,
    pub audio_bytes: usize,
    pub duration_ms: Option<u64>,
    pub timestamp_ms: u64,
}

/// Aggregated view over the retained records
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageStats {
    pub total_requests: usize,
    pub total_characters: usize,
    pub total_audio_bytes: usize,
    pub by_engine: std::collections::HashMap<String, usize>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start_ms: u64,
    count: u32,
}

pub struct UsageService {
    windows: DashMap<String, Window>,
    records: Mutex<VecDeque<UsageRecord>>,
}

impl Default for UsageService {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageService {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
            records: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }

    /// Admit or reject a request under the key's fixed-window limit.
    ///
    /// Admin keys are never throttled. A limit of zero disables the key's
    /// quota entirely.
    pub fn check_rate_limit(&self, key: &ApiKey) -> GatewayResult<()> {
        if key.is_admin {
            return Ok(());
        }
        let limit = key.rate_limit;
        if limit == 0 {
            return Err(GatewayError::RateLimited {
                retry_after: Duration::from_millis(WINDOW_MS),
            });
        }

        let now = unix_ms();
        let mut entry = self.windows.entry(key.id.clone()).or_insert(Window {
            start_ms: now,
            count: 0,
        });

        if now.saturating_sub(entry.start_ms) >= WINDOW_MS {
            entry.start_ms = now;
            entry.count = 0;
        }

        if entry.count >= limit {
            let elapsed = now.saturating_sub(entry.start_ms);
            let remaining = WINDOW_MS.saturating_sub(elapsed).max(1);
            debug!(key_id = %key.id, limit, "rate limit exceeded");
            return Err(GatewayError::RateLimited {
                retry_after: Duration::from_millis(remaining),
            });
        }

        entry.count += 1;
        Ok(())
    }

    /// Record one completed synthesis, evicting the oldest entry at capacity.
    pub fn record(&self, record: UsageRecord) {
        let mut records = self.records.lock();
        if records.len() >= MAX_RECORDS {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn records_for(&self, key_id: Option<&str>, limit: usize) -> Vec<UsageRecord> {
        let records = self.records.lock();
        records
            .iter()
            .rev()
            .filter(|r| key_id.is_none_or(|id| r.key_id == id))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self, key_id: Option<&str>) -> UsageStats {
        let records = self.records.lock();
        let mut stats = UsageStats::default();
        for record in records.iter() {
            if key_id.is_some_and(|id| record.key_id != id) {
                continue;
            }
            stats.total_requests += 1;
            stats.total_characters += record.characters;
            stats.total_audio_bytes += record.audio_bytes;
            *stats
                .by_engine
                .entry(record.engine.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats
    }

    /// Drop windows that ended long enough ago to be irrelevant.
    pub fn sweep_expired(&self) {
        let now = unix_ms();
        self.windows
            .retain(|_, w| now.saturating_sub(w.start_ms) < WINDOW_MS * 2);
    }

    /// Periodic background sweep of stale windows.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                service.sweep_expired();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(id: &str) -> ApiKey {
        ApiKey {
            id: id.to_string(),
            name: "test".to_string(),
            secret_hash: "hash".to_string(),
            suffix: "abcd1234".to_string(),
            is_admin: false,
            active: true,
            rate_limit: crate::keys::DEFAULT_RATE_LIMIT,
            expires_at_ms: None,
            created_at_ms: unix_ms(),
            last_used_ms: None,
            request_count: 0,
            engines: Default::default(),
        }
    }

    fn key_with_limit(limit: u32) -> ApiKey {
        test_key("k1").with_rate_limit(limit)
    }

    fn record_for(key_id: &str, characters: usize) -> UsageRecord {
        UsageRecord {
            key_id: key_id.to_string(),
            engine: EngineKind::Espeak,
            voice: "espeak:en".to_string(),
            path: "/api/speak".to_string(),
            status: 200,
            characters,
            audio_bytes: characters * 32,
            duration_ms: Some(100),
            timestamp_ms: unix_ms(),
        }
    }

    #[test]
    fn test_requests_under_limit_pass() {
        let service = UsageService::new();
        let key = key_with_limit(3);
        for _ in 0..3 {
            service.check_rate_limit(&key).unwrap();
        }
        let err = service.check_rate_limit(&key).unwrap_err();
        match err {
            GatewayError::RateLimited { retry_after } => {
                assert!(retry_after.as_millis() >= 1);
                assert!(retry_after.as_millis() as u64 <= WINDOW_MS);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_admin_keys_bypass_limits() {
        let service = UsageService::new();
        let key = key_with_limit(1).with_admin(true);
        for _ in 0..10 {
            service.check_rate_limit(&key).unwrap();
        }
    }

    #[test]
    fn test_zero_limit_rejects_immediately() {
        let service = UsageService::new();
        let key = key_with_limit(0);
        assert!(matches!(
            service.check_rate_limit(&key),
            Err(GatewayError::RateLimited { .. })
        ));
    }

    #[test]
    fn test_windows_are_per_key() {
        let service = UsageService::new();
        let a = key_with_limit(1);
        let b = test_key("k2").with_rate_limit(1);
        service.check_rate_limit(&a).unwrap();
        service.check_rate_limit(&b).unwrap();
        assert!(service.check_rate_limit(&a).is_err());
    }

    #[test]
    fn test_record_ring_caps_at_max() {
        let service = UsageService::new();
        for i in 0..MAX_RECORDS + 5 {
            service.record(record_for("k1", i));
        }
        assert_eq!(service.records.lock().len(), MAX_RECORDS);
        // Oldest entries are the ones evicted.
        assert_eq!(service.records.lock().front().unwrap().characters, 5);
    }

    #[test]
    fn test_stats_filter_by_key() {
        let service = UsageService::new();
        service.record(record_for("k1", 10));
        service.record(record_for("k1", 20));
        service.record(record_for("k2", 40));

        let all = service.stats(None);
        assert_eq!(all.total_requests, 3);
        assert_eq!(all.total_characters, 70);
        assert_eq!(all.by_engine.get("espeak"), Some(&3));

        let k1 = service.stats(Some("k1"));
        assert_eq!(k1.total_requests, 2);
        assert_eq!(k1.total_characters, 30);
    }

    #[test]
    fn test_sweep_drops_stale_windows() {
        let service = UsageService::new();
        let key = key_with_limit(5);
        service.check_rate_limit(&key).unwrap();
        service
            .windows
            .get_mut(&key.id)
            .unwrap()
            .start_ms = unix_ms() - WINDOW_MS * 3;
        service.sweep_expired();
        assert!(service.windows.get(&key.id).is_none());
    }
}
