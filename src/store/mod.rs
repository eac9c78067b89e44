//! Shared counter store adapters.
//!
//! The rate limiter never holds counter state itself. Every decision goes
//! through a [`CounterStore`], which is the single source of truth shared by
//! all gate replicas. Two implementations are provided: [`RedisStore`] for
//! real deployments and [`MemoryStore`] for tests and single-process use.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Longest time-to-live a store will apply to a counter (100 years).
///
/// Longer windows are clamped to this value. Redis rejects `PEXPIRE` values
/// whose absolute deadline overflows, and an `Instant` cannot be pushed
/// arbitrarily far into the future.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Errors raised by a counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Contract the rate limiter requires of an external atomic counter store.
///
/// Implementations must make `increment_and_expire` all-or-nothing with
/// respect to the key: either both the increment and the new expiry take
/// effect, or neither does. It does not need to be atomic together with a
/// preceding `get_int`.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the integer counter stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or has expired.
    async fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Increment the counter under `key` by one and set its time-to-live to
    /// `ttl`, as one transaction. Returns the incremented value.
    async fn increment_and_expire(&self, key: &str, ttl: Duration) -> Result<i64, StoreError>;
}

