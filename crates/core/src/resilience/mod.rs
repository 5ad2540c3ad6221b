//! Resilience primitives shared by every external API client.
//!
//! - Circuit breaker: stops calling a dependency that keeps failing.
//! - Key pool: rotates alternate credentials to survive per-key rate limits.
//! - Retry policy: exponential backoff for transient failures.

mod circuit_breaker;
mod key_pool;
mod retry;

pub use circuit_breaker::{
    BreakerConfig, BreakerError, BreakerRegistry, BreakerSnapshot, BreakerState, CircuitBreaker,
};
pub use key_pool::{KeyPool, KeyPoolConfig, KeyStatus};
pub use retry::{retry_with_policy, RetryPolicy, Transient};
