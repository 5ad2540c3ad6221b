//! Read-only health snapshots over the service's shared dependencies.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheManager;
use crate::resilience::{BreakerRegistry, BreakerSnapshot, BreakerState, KeyPool, KeyStatus};

/// Health of the cache backend as of the last probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    pub healthy: bool,
    pub last_tested: DateTime<Utc>,
    pub error: Option<String>,
}

/// One credential pool's status, keyed by the service it backs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPoolHealth {
    pub name: String,
    pub keys: Vec<KeyStatus>,
    pub available_keys: usize,
}

/// Point-in-time view of the service's dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    pub cache: CacheHealth,
    pub breakers: Vec<BreakerSnapshot>,
    pub key_pools: Vec<KeyPoolHealth>,
}

/// Aggregates breaker, key pool and cache state into one snapshot. Purely
/// observational; it never mutates the components it watches.
pub struct HealthMonitor {
    breakers: Arc<BreakerRegistry>,
    key_pools: Vec<(String, Arc<KeyPool>)>,
    cache: Arc<CacheManager>,
}

impl HealthMonitor {
    pub fn new(breakers: Arc<BreakerRegistry>, cache: Arc<CacheManager>) -> Self {
        Self {
            breakers,
            key_pools: Vec::new(),
            cache,
        }
    }

    pub fn with_key_pool(mut self, name: impl Into<String>, pool: Arc<KeyPool>) -> Self {
        self.key_pools.push((name.into(), pool));
        self
    }

    /// Take a snapshot. Unhealthy means the cache probe failed, a breaker is
    /// open, or a credential pool has no available keys.
    pub async fn snapshot(&self) -> HealthSnapshot {
        let checked_at = Utc::now();

        let cache = match self.cache.health_check().await {
            Ok(()) => CacheHealth {
                healthy: true,
                last_tested: checked_at,
                error: None,
            },
            Err(e) => CacheHealth {
                healthy: false,
                last_tested: checked_at,
                error: Some(e.to_string()),
            },
        };

        let breakers = self.breakers.snapshot();
        let key_pools: Vec<KeyPoolHealth> = self
            .key_pools
            .iter()
            .map(|(name, pool)| {
                let keys = pool.snapshot();
                let available_keys = keys.iter().filter(|k| k.available).count();
                KeyPoolHealth {
                    name: name.clone(),
                    keys,
                    available_keys,
                }
            })
            .collect();

        let healthy = cache.healthy
            && breakers.iter().all(|b| b.state != BreakerState::Open)
            && key_pools.iter().all(|p| p.available_keys > 0);

        HealthSnapshot {
            healthy,
            checked_at,
            cache,
            breakers,
            key_pools,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::resilience::{BreakerConfig, KeyPoolConfig};

    fn monitor() -> HealthMonitor {
        let cache = Arc::new(CacheManager::new(
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
        ));
        HealthMonitor::new(Arc::new(BreakerRegistry::new(BreakerConfig::default())), cache)
    }

    #[tokio::test]
    async fn test_snapshot_healthy_by_default() {
        let snapshot = monitor().snapshot().await;
        assert!(snapshot.healthy);
        assert!(snapshot.cache.healthy);
        assert!(snapshot.breakers.is_empty());
    }

    #[tokio::test]
    async fn test_open_breaker_marks_unhealthy() {
        let registry = Arc::new(BreakerRegistry::new(BreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        }));
        let breaker = registry.get_or_create("llm");
        let _: Result<(), _> = breaker.execute(|| async { Err::<(), &str>("boom") }).await;

        let cache = Arc::new(CacheManager::new(
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
        ));
        let snapshot = HealthMonitor::new(registry, cache).snapshot().await;
        assert!(!snapshot.healthy);
        assert_eq!(snapshot.breakers.len(), 1);
        assert_eq!(snapshot.breakers[0].state, BreakerState::Open);
    }

    #[tokio::test]
    async fn test_benched_pool_marks_unhealthy() {
        let pool = Arc::new(KeyPool::new(
            "fireflies",
            vec!["key-1".into()],
            KeyPoolConfig {
                min_request_interval: Duration::ZERO,
                ..Default::default()
            },
        ));
        pool.mark_unavailable(0, None);

        let snapshot = monitor()
            .with_key_pool("fireflies", pool)
            .snapshot()
            .await;
        assert!(!snapshot.healthy);
        assert_eq!(snapshot.key_pools[0].available_keys, 0);
    }
}
