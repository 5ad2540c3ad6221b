//! Transcript payload cache with staleness tracking.
//!
//! Entries carry their own expiry timestamp so callers can distinguish a
//! fresh hit from a stale one and fall back to stale data when the upstream
//! is unreachable. Cache failures never fail the caller; they degrade to a
//! miss.

mod key;
mod manager;
mod memory;

pub use key::CacheKey;
pub use manager::{CacheLookup, CacheManager};
pub use memory::MemoryCache;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// A cached payload plus the timestamps needed for staleness decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: serde_json::Value,
    pub cached_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// An entry with no expiry timestamp cannot prove freshness, so it
    /// counts as stale.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now,
            None => true,
        }
    }
}

/// Storage backend for cache entries.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;
    /// Drop every entry, returning how many were removed.
    async fn clear(&self) -> Result<u64, CacheError>;
}
