//! Request gate wiring.
//!
//! The gate classifies each inbound request into an identity and limit tier,
//! asks the [`RateLimiter`] for a decision and turns that decision into a
//! [`Verdict`]. It owns no counter state; all coordination lives in the
//! shared store.
//!
//! Store failures fail closed: a request whose decision could not be made is
//! rejected with an internal error rather than let through.

mod identity;
mod middleware;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tracing::{debug, error, info};

use crate::ratelimit::RateLimiter;
use crate::store::CounterStore;

pub use identity::{HeaderIdentityPolicy, Identity, IdentityPolicy, Tier};
pub use middleware::{enforce, LIMITED_MESSAGE, STORE_FAILURE_MESSAGE};

/// Per-tier limits and the shared window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    /// Actions per window for address-keyed callers
    pub anonymous: u64,
    /// Actions per window for token-keyed callers
    pub credentialed: u64,
    /// Window length
    pub window: Duration,
}

impl TierLimits {
    /// The limit that applies to `tier`.
    pub fn limit_for(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Anonymous => self.anonymous,
            Tier::Credentialed => self.credentialed,
        }
    }
}

/// Outcome of gating a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Proceed to the protected work
    Allow,
    /// The caller exhausted its allowance for the window
    Limited,
    /// No decision could be made; rejected with an internal error
    Failed,
}

/// Rate-limiting gate placed in front of protected work.
pub struct Gate<S> {
    limiter: RateLimiter<S>,
    policy: Arc<dyn IdentityPolicy>,
    limits: TierLimits,
}

impl<S: CounterStore> Gate<S> {
    /// Create a gate using the default header-based identity policy.
    pub fn new(limiter: RateLimiter<S>, limits: TierLimits) -> Self {
        Self::with_policy(limiter, HeaderIdentityPolicy::default(), limits)
    }

    /// Create a gate with a custom identity policy.
    pub fn with_policy<P>(limiter: RateLimiter<S>, policy: P, limits: TierLimits) -> Self
    where
        P: IdentityPolicy + 'static,
    {
        Self {
            limiter,
            policy: Arc::new(policy),
            limits,
        }
    }

    /// Classify a request and decide whether it may proceed.
    pub async fn evaluate(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Verdict {
        let identity = self.policy.classify(headers, peer);
        self.decide(&identity).await
    }

    /// Decide for an already classified identity.
    pub async fn decide(&self, identity: &Identity) -> Verdict {
        let limit = self.limits.limit_for(identity.tier);
        let key = identity.key.to_store_key();

        match self
            .limiter
            .limit_reached(&key, limit, self.limits.window)
            .await
        {
            Ok(false) => {
                debug!(key = %key, tier = ?identity.tier, "Request allowed");
                Verdict::Allow
            }
            Ok(true) => {
                info!(key = %key, tier = ?identity.tier, limit = limit, "Request rate limited");
                Verdict::Limited
            }
            Err(e) => {
                error!(key = %key, error = %e, "Rate limit check failed, rejecting request");
                Verdict::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::IdentityKey;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use axum::http::HeaderValue;

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn get_int(&self, _key: &str) -> Result<Option<i64>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn increment_and_expire(&self, _key: &str, _ttl: Duration) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    /// Policy that keys every request on a fixed subject.
    struct FixedPolicy;

    impl IdentityPolicy for FixedPolicy {
        fn classify(&self, _headers: &HeaderMap, _peer: Option<IpAddr>) -> Identity {
            Identity {
                key: IdentityKey::ip("fixed"),
                tier: Tier::Credentialed,
            }
        }
    }

    fn limits() -> TierLimits {
        TierLimits {
            anonymous: 1,
            credentialed: 2,
            window: Duration::from_secs(60),
        }
    }

    fn memory_gate() -> Gate<MemoryStore> {
        Gate::new(RateLimiter::new(Arc::new(MemoryStore::new())), limits())
    }

    #[test]
    fn test_limit_for_tier() {
        assert_eq!(limits().limit_for(Tier::Anonymous), 1);
        assert_eq!(limits().limit_for(Tier::Credentialed), 2);
    }

    #[tokio::test]
    async fn test_anonymous_tier_limit() {
        let gate = memory_gate();
        let peer = Some("10.1.1.1".parse().unwrap());

        assert_eq!(gate.evaluate(&HeaderMap::new(), peer).await, Verdict::Allow);
        assert_eq!(gate.evaluate(&HeaderMap::new(), peer).await, Verdict::Limited);
    }

    #[tokio::test]
    async fn test_credentialed_tier_limit() {
        let gate = memory_gate();
        let mut headers = HeaderMap::new();
        headers.insert("api_key", HeaderValue::from_static("secret"));

        assert_eq!(gate.evaluate(&headers, None).await, Verdict::Allow);
        assert_eq!(gate.evaluate(&headers, None).await, Verdict::Allow);
        assert_eq!(gate.evaluate(&headers, None).await, Verdict::Limited);

        // The same caller without its token is counted separately
        let peer = Some("10.1.1.1".parse().unwrap());
        assert_eq!(gate.evaluate(&HeaderMap::new(), peer).await, Verdict::Allow);
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let gate = Gate::new(RateLimiter::new(Arc::new(BrokenStore)), limits());
        assert_eq!(gate.evaluate(&HeaderMap::new(), None).await, Verdict::Failed);
    }

    #[tokio::test]
    async fn test_custom_policy() {
        let store = MemoryStore::new();
        let gate = Gate::with_policy(
            RateLimiter::new(Arc::new(store.clone())),
            FixedPolicy,
            limits(),
        );

        gate.evaluate(&HeaderMap::new(), None).await;
        assert_eq!(store.get_int("ip:fixed").await.unwrap(), Some(1));
    }
}
