//! Circuit breaker state machine.
//!
//! One breaker instance guards one named external dependency. Callers wrap
//! their upstream calls in [`CircuitBreaker::execute`]; after enough
//! consecutive failures the breaker opens and rejects calls immediately
//! until a cooldown has passed, then probes the dependency in half-open
//! state before closing again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Breaker tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures in Closed before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe call.
    pub timeout: Duration,
    /// Consecutive successes in HalfOpen before the breaker closes.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

/// The three breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker rejected the call without attempting it.
    Open { name: String },
    /// The operation ran and failed with its own error.
    Operation(E),
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
}

/// Per-dependency circuit breaker.
///
/// All state reads and transitions are guarded by a single mutex, so one
/// instance can be shared across concurrent pipeline runs.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// Read-only view of a breaker's counters for health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
                last_success_time: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. An expired Open cooldown is reported as Open until the
    /// next call attempt transitions it to HalfOpen.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    /// Check whether a call may proceed, transitioning Open -> HalfOpen when
    /// the cooldown has elapsed.
    fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|t| Utc::now().signed_duration_since(t))
                    .and_then(|d| d.to_std().ok());
                match elapsed {
                    Some(d) if d >= self.config.timeout => {
                        info!(breaker = %self.name, "circuit breaker half-open, allowing probe");
                        inner.state = BreakerState::HalfOpen;
                        inner.success_count = 0;
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_success_time = Some(Utc::now());
        if inner.state == BreakerState::HalfOpen {
            inner.success_count += 1;
            if inner.success_count >= self.config.success_threshold {
                info!(breaker = %self.name, "circuit breaker closed after recovery");
                inner.state = BreakerState::Closed;
                inner.failure_count = 0;
            }
        } else if inner.state == BreakerState::Closed {
            inner.failure_count = 0;
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_count += 1;
        inner.last_failure_time = Some(Utc::now());
        match inner.state {
            BreakerState::Closed if inner.failure_count >= self.config.failure_threshold => {
                warn!(
                    breaker = %self.name,
                    failures = inner.failure_count,
                    "circuit breaker opened"
                );
                inner.state = BreakerState::Open;
            }
            // Any failure during the probe phase sends us straight back.
            BreakerState::HalfOpen => {
                warn!(breaker = %self.name, "probe failed, circuit breaker re-opened");
                inner.state = BreakerState::Open;
                inner.failure_count = 0;
                inner.success_count = 0;
            }
            _ => {}
        }
    }

    /// Run `op` under the breaker, recording its outcome.
    ///
    /// Fails fast with [`BreakerError::Open`] when the breaker is rejecting
    /// calls; otherwise the operation's own result is propagated.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.can_execute() {
            return Err(BreakerError::Open {
                name: self.name.clone(),
            });
        }
        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Operation(e))
            }
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().unwrap();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            failure_threshold: self.config.failure_threshold,
        }
    }

    #[cfg(test)]
    fn backdate_last_failure(&self, by: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_failure_time = inner
            .last_failure_time
            .map(|t| t - chrono::Duration::from_std(by).unwrap());
    }
}

/// Registry holding one breaker per named dependency.
///
/// Constructed once at the composition root and handed to the clients that
/// need it; there is deliberately no global instance.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        Arc::clone(
            breakers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone()))),
        )
    }

    /// Read-only snapshots of every registered breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let breakers = self.breakers.lock().unwrap();
        let mut snapshots: Vec<BreakerSnapshot> =
            breakers.values().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
