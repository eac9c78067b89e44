//! Core rate limiter implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::error::{GatekeeperError, Result};
use crate::store::{CounterStore, StoreError};

/// Default bound on a single counter store round-trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// Fixed-window rate limiter backed by a shared counter store.
///
/// The limiter holds no counter state of its own. Each check reads the
/// counter for the key and, if the caller is still under its limit, records
/// the action by incrementing the counter and resetting its expiry to the
/// full window in one store transaction. Rejected checks are never recorded.
///
/// The read and the increment are two separate round-trips. Concurrent
/// callers that all read a value below the limit will all be allowed, so the
/// counter can overshoot the limit under contention. The limit is therefore a
/// hard cap for serialized access and a soft cap under concurrency.
///
/// Because every allowed action refreshes the expiry, a key that keeps
/// generating allowed traffic keeps its counter alive; the window creeps
/// forward rather than snapping to fixed wall-clock boundaries.
pub struct RateLimiter<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: CounterStore> RateLimiter<S> {
    /// Create a new rate limiter using the default store timeout.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_timeout(store, DEFAULT_STORE_TIMEOUT)
    }

    /// Create a new rate limiter with a custom bound on store round-trips.
    pub fn with_timeout(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Decide whether `key` has used up `limit` actions in the current window.
    ///
    /// Returns `Ok(true)` when the limit is reached; nothing is recorded in
    /// that case. Returns `Ok(false)` when the action is allowed, after the
    /// action has been counted. Any store failure or timeout is returned as
    /// an error with no decision made.
    ///
    /// Degenerate inputs never panic:
    /// - an empty key is rejected with [`GatekeeperError::InvalidKey`],
    /// - a zero `limit` is always reached and does not touch the store,
    /// - a zero `window` never persists a counter, so it is always allowed.
    pub async fn limit_reached(&self, key: &str, limit: u64, window: Duration) -> Result<bool> {
        if key.is_empty() {
            warn!("Rejecting rate limit check with empty key");
            return Err(GatekeeperError::InvalidKey);
        }

        if limit == 0 {
            debug!(key = %key, "Zero limit configured, treating as reached");
            return Ok(true);
        }

        if window.is_zero() {
            debug!(key = %key, "Zero window configured, nothing to record");
            return Ok(false);
        }

        trace!(
            key = %key,
            limit = limit,
            window = ?window,
            "Checking rate limit"
        );

        let current = self.current_count(key).await?;

        if current >= limit {
            debug!(
                key = %key,
                count = current,
                limit = limit,
                "Rate limit exceeded"
            );
            return Ok(true);
        }

        let count = self
            .bounded("transaction", self.store.increment_and_expire(key, window))
            .await?;

        trace!(key = %key, count = count, limit = limit, "Action recorded");

        Ok(false)
    }

    /// Read the current counter value for `key` without modifying it.
    ///
    /// An absent or expired counter reads as zero.
    pub async fn current_count(&self, key: &str) -> Result<u64> {
        let value = self.bounded("read", self.store.get_int(key)).await?;
        Ok(value.map_or(0, |v| u64::try_from(v).unwrap_or(0)))
    }

    /// Run a store operation under the configured timeout.
    ///
    /// A timed-out operation is dropped, so an increment that had not yet
    /// been submitted is never applied.
    async fn bounded<T, F>(&self, operation: &'static str, op: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(operation = operation, error = %e, "Counter store operation failed");
                Err(GatekeeperError::Store(e))
            }
            Err(_) => {
                warn!(
                    operation = operation,
                    timeout = ?self.timeout,
                    "Counter store operation timed out"
                );
                Err(GatekeeperError::Timeout {
                    operation,
                    timeout: self.timeout,
                })
            }
        }
    }
}

impl<S> Clone for RateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            timeout: self.timeout,
        }
    }
}
