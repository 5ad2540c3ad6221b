//! Cache facade used by the transcript source and pipeline.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{CacheBackend, CacheEntry, CacheError, CacheKey};

/// Outcome of a typed cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<T> {
    Fresh(T),
    /// Present but past its expiry, usable only as a fallback.
    Stale(T),
    Miss,
}

/// Wraps a [`CacheBackend`] with typed accessors and degrade-to-miss error
/// handling. A broken cache slows the pipeline down; it never stops it.
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    default_ttl: Duration,
}

impl CacheManager {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Duration) -> Self {
        Self {
            backend,
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Typed lookup. Backend errors and undeserializable payloads both
    /// degrade to [`CacheLookup::Miss`].
    pub async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheLookup<T> {
        let rendered = key.render();
        let entry = match self.backend.get(&rendered).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %rendered, error = %e, "cache read failed, treating as miss");
                return CacheLookup::Miss;
            }
        };
        let Some(entry) = entry else {
            debug!(key = %rendered, "cache miss");
            return CacheLookup::Miss;
        };
        let stale = entry.is_stale(Utc::now());
        match serde_json::from_value(entry.payload) {
            Ok(value) if stale => {
                debug!(key = %rendered, "cache hit (stale)");
                CacheLookup::Stale(value)
            }
            Ok(value) => {
                debug!(key = %rendered, "cache hit");
                CacheLookup::Fresh(value)
            }
            Err(e) => {
                warn!(key = %rendered, error = %e, "cached payload unreadable, treating as miss");
                CacheLookup::Miss
            }
        }
    }

    /// Store a value under the default TTL.
    pub async fn store<T: Serialize>(&self, key: &CacheKey, value: &T) {
        self.store_with_ttl(key, value, self.default_ttl).await;
    }

    /// Store a value with an explicit TTL. Failures are logged and dropped.
    pub async fn store_with_ttl<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let rendered = key.render();
        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %rendered, error = %e, "cache serialization failed, skipping store");
                return;
            }
        };
        let now = Utc::now();
        let entry = CacheEntry {
            payload,
            cached_at: now,
            expires_at: chrono::Duration::from_std(ttl)
                .ok()
                .map(|ttl| now + ttl),
        };
        if let Err(e) = self.backend.put(&rendered, entry).await {
            warn!(key = %rendered, error = %e, "cache write failed");
        }
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        let rendered = key.render();
        if let Err(e) = self.backend.remove(&rendered).await {
            warn!(key = %rendered, error = %e, "cache invalidation failed");
        }
    }

    /// Drop everything, returning how many entries were removed.
    pub async fn clear_all(&self) -> u64 {
        match self.backend.clear().await {
            Ok(count) => {
                debug!(count, "cache cleared");
                count
            }
            Err(e) => {
                warn!(error = %e, "cache clear failed");
                0
            }
        }
    }

    /// Write-then-read probe for health reporting.
    pub async fn health_check(&self) -> Result<(), CacheError> {
        let key = CacheKey::new("health", "probe");
        let token = uuid::Uuid::new_v4().to_string();
        self.store_with_ttl(&key, &token, Duration::from_secs(10))
            .await;
        match self.lookup::<String>(&key).await {
            CacheLookup::Fresh(read) if read == token => Ok(()),
            _ => Err(CacheError::Backend(
                "health probe did not read back".to_string(),
            )),
        }
    }
}
