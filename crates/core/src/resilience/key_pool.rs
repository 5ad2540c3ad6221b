//! Rotating pool of API credentials.
//!
//! Some upstream services rate-limit per key. The pool hands out keys
//! round-robin, spaces out consecutive acquisitions, and benches a key for a
//! cooldown period when the caller reports it exhausted. Benched keys come
//! back automatically once their cooldown timestamp passes; there is no
//! background task, the sweep happens inside `acquire`.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Pool tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPoolConfig {
    /// Minimum spacing between two acquisitions, pool-wide.
    pub min_request_interval: Duration,
    /// How long an exhausted key stays benched when the upstream gave no hint.
    pub default_cooldown: Duration,
}

impl Default for KeyPoolConfig {
    fn default() -> Self {
        Self {
            min_request_interval: Duration::from_secs(3),
            default_cooldown: Duration::from_secs(300),
        }
    }
}

/// Availability of a single key, exposed for health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyStatus {
    /// Position of the key in the pool, not the key itself.
    pub index: usize,
    pub available: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub use_count: u64,
    pub exhausted_count: u64,
}

#[derive(Debug)]
struct KeySlot {
    key: String,
    cooldown_until: Option<DateTime<Utc>>,
    use_count: u64,
    exhausted_count: u64,
}

#[derive(Debug)]
struct PoolInner {
    slots: Vec<KeySlot>,
    cursor: usize,
    last_acquired_at: Option<DateTime<Utc>>,
}

/// Round-robin credential pool with per-key cooldowns.
pub struct KeyPool {
    name: String,
    config: KeyPoolConfig,
    inner: Mutex<PoolInner>,
}

impl KeyPool {
    /// Build a pool over the given keys. Empty or blank keys are dropped.
    pub fn new(name: impl Into<String>, keys: Vec<String>, config: KeyPoolConfig) -> Self {
        let slots = keys
            .into_iter()
            .filter(|k| !k.trim().is_empty())
            .map(|key| KeySlot {
                key,
                cooldown_until: None,
                use_count: 0,
                exhausted_count: 0,
            })
            .collect();
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(PoolInner {
                slots,
                cursor: 0,
                last_acquired_at: None,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick the next usable key, waiting out the pool-wide minimum interval.
    ///
    /// Returns `None` only when the pool holds no keys at all. When every key
    /// is cooling down, the least-recently benched key is handed out anyway
    /// as a best-effort attempt rather than stalling the pipeline.
    pub async fn acquire(&self) -> Option<(usize, String)> {
        let wait = {
            let inner = self.inner.lock().unwrap();
            if inner.slots.is_empty() {
                return None;
            }
            inner.last_acquired_at.and_then(|at| {
                let next_allowed = at
                    + chrono::Duration::from_std(self.config.min_request_interval)
                        .unwrap_or_else(|_| chrono::Duration::seconds(3));
                next_allowed
                    .signed_duration_since(Utc::now())
                    .to_std()
                    .ok()
            })
        };
        if let Some(wait) = wait {
            debug!(pool = %self.name, wait_ms = wait.as_millis() as u64, "throttling key acquisition");
            tokio::time::sleep(wait).await;
        }

        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        // Sweep expired cooldowns before picking.
        for slot in inner.slots.iter_mut() {
            if matches!(slot.cooldown_until, Some(until) if until <= now) {
                info!(pool = %self.name, "key cooldown expired, back in rotation");
                slot.cooldown_until = None;
            }
        }

        let len = inner.slots.len();
        let start = inner.cursor;
        let mut chosen = None;
        for offset in 0..len {
            let idx = (start + offset) % len;
            if inner.slots[idx].cooldown_until.is_none() {
                chosen = Some(idx);
                break;
            }
        }
        let idx = chosen.unwrap_or_else(|| {
            // All keys benched. Take the one whose cooldown ends soonest.
            warn!(pool = %self.name, "all keys cooling down, using best-effort key");
            inner
                .slots
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.cooldown_until)
                .map(|(i, _)| i)
                .unwrap_or(0)
        });

        inner.cursor = (idx + 1) % len;
        inner.last_acquired_at = Some(now);
        inner.slots[idx].use_count += 1;
        Some((idx, inner.slots[idx].key.clone()))
    }

    /// Bench a key after the upstream rejected it for quota reasons.
    ///
    /// `retry_after` overrides the configured default cooldown when the
    /// upstream said how long to wait.
    pub fn mark_unavailable(&self, index: usize, retry_after: Option<Duration>) {
        let mut inner = self.inner.lock().unwrap();
        let Some(slot) = inner.slots.get_mut(index) else {
            return;
        };
        let cooldown = retry_after.unwrap_or(self.config.default_cooldown);
        let until = Utc::now()
            + chrono::Duration::from_std(cooldown).unwrap_or_else(|_| chrono::Duration::seconds(300));
        slot.cooldown_until = Some(until);
        slot.exhausted_count += 1;
        warn!(
            pool = %self.name,
            key_index = index,
            cooldown_secs = cooldown.as_secs(),
            "key benched"
        );
    }

    /// Per-key availability, in pool order. Keys themselves are not exposed.
    pub fn snapshot(&self) -> Vec<KeyStatus> {
        let inner = self.inner.lock().unwrap();
        let now = Utc::now();
        inner
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| KeyStatus {
                index,
                available: !matches!(slot.cooldown_until, Some(until) if until > now),
                cooldown_until: slot.cooldown_until,
                use_count: slot.use_count,
                exhausted_count: slot.exhausted_count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> KeyPoolConfig {
        KeyPoolConfig {
            min_request_interval: Duration::from_millis(0),
            default_cooldown: Duration::from_secs(300),
        }
    }

    fn pool(keys: &[&str]) -> KeyPool {
        KeyPool::new(
            "test",
            keys.iter().map(|k| k.to_string()).collect(),
            fast_config(),
        )
    }

    #[tokio::test]
    async fn test_round_robin_rotation() {
        let pool = pool(&["a", "b", "c"]);
        let keys: Vec<String> = [
            pool.acquire().await.unwrap().1,
            pool.acquire().await.unwrap().1,
            pool.acquire().await.unwrap().1,
            pool.acquire().await.unwrap().1,
        ]
        .into();
        assert_eq!(keys, vec!["a", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_empty_pool_yields_none() {
        let pool = pool(&[]);
        assert!(pool.acquire().await.is_none());
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_blank_keys_are_dropped() {
        let pool = pool(&["a", "  ", ""]);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_benched_key_is_skipped() {
        let pool = pool(&["a", "b"]);
        let (idx, key) = pool.acquire().await.unwrap();
        assert_eq!(key, "a");
        pool.mark_unavailable(idx, None);

        // "a" is next in rotation order but benched.
        for _ in 0..3 {
            let (_, key) = pool.acquire().await.unwrap();
            assert_eq!(key, "b");
        }
    }

    #[tokio::test]
    async fn test_cooldown_expiry_restores_key() {
        let pool = pool(&["a", "b"]);
        let (idx, _) = pool.acquire().await.unwrap();
        pool.mark_unavailable(idx, Some(Duration::from_millis(0)));

        let (_, key) = pool.acquire().await.unwrap();
        assert_eq!(key, "b");
        // Zero cooldown means the sweep restores "a" immediately.
        let (_, key) = pool.acquire().await.unwrap();
        assert_eq!(key, "a");
    }

    #[tokio::test]
    async fn test_all_benched_falls_back_to_soonest_free() {
        let pool = pool(&["a", "b"]);
        let (idx_a, _) = pool.acquire().await.unwrap();
        let (idx_b, _) = pool.acquire().await.unwrap();
        pool.mark_unavailable(idx_a, Some(Duration::from_secs(600)));
        pool.mark_unavailable(idx_b, Some(Duration::from_secs(60)));

        let (_, key) = pool.acquire().await.unwrap();
        assert_eq!(key, "b");
    }

    #[tokio::test]
    async fn test_snapshot_reports_counts() {
        let pool = pool(&["a", "b"]);
        let (idx, _) = pool.acquire().await.unwrap();
        pool.mark_unavailable(idx, None);

        let statuses = pool.snapshot();
        assert_eq!(statuses.len(), 2);
        assert!(!statuses[0].available);
        assert_eq!(statuses[0].use_count, 1);
        assert_eq!(statuses[0].exhausted_count, 1);
        assert!(statuses[1].available);
    }

    #[tokio::test]
    async fn test_min_interval_spacing() {
        let pool = KeyPool::new(
            "test",
            vec!["a".into()],
            KeyPoolConfig {
                min_request_interval: Duration::from_millis(30),
                default_cooldown: Duration::from_secs(300),
            },
        );
        let started = std::time::Instant::now();
        pool.acquire().await.unwrap();
        pool.acquire().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(25));
    }
}
