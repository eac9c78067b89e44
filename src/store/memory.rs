//! In-memory counter store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;

use super::{CounterStore, StoreError, MAX_TTL};

/// Expired counters are swept once every this many increments.
const PURGE_INTERVAL: u64 = 1024;

/// In-memory implementation of [`CounterStore`] with per-key expiry.
///
/// **Single-process only.** Counters live in this process and are not shared
/// with other gate replicas, so this store is meant for tests and local
/// development. Clones share the same underlying map.
///
/// Expiry uses `tokio::time::Instant`, which lets tests drive it with a
/// paused runtime clock. Expired counters are swept every
/// `PURGE_INTERVAL` increments; [`MemoryStore::purge_expired`] sweeps on
/// demand.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, CounterEntry>>,
    writes: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: i64,
    expires_at: Instant,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) counters.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    /// Whether the store holds no live counters.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time-to-live of a live counter.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Drop every counter whose expiry has passed.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// Remove all counters.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value);
        Ok(value)
    }

    async fn increment_and_expire(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        // Sweep before taking the entry guard; `retain` locks every shard.
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_INTERVAL == PURGE_INTERVAL - 1 {
            self.purge_expired();
        }

        let now = Instant::now();

        // The entry guard holds the shard lock, so the increment and the
        // expiry update are applied together.
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(CounterEntry {
                value: 0,
                expires_at: now,
            });

        if entry.is_expired(now) {
            entry.value = 0;
        }
        entry.value += 1;
        entry.expires_at = now.checked_add(ttl).unwrap_or_else(|| now + MAX_TTL);

        trace!(key = %key, value = entry.value, ttl = ?ttl, "Incremented in-memory counter");

        Ok(entry.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_absent_key_reads_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get_int("missing").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_increment_creates_and_counts() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(store.increment_and_expire("ip:1.2.3.4", ttl).await.unwrap(), 1);
        assert_eq!(store.increment_and_expire("ip:1.2.3.4", ttl).await.unwrap(), 2);
        assert_eq!(store.get_int("ip:1.2.3.4").await.unwrap(), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_separate_keys() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        store.increment_and_expire("token:a", ttl).await.unwrap();
        store.increment_and_expire("token:a", ttl).await.unwrap();
        store.increment_and_expire("token:b", ttl).await.unwrap();

        assert_eq!(store.get_int("token:a").await.unwrap(), Some(2));
        assert_eq!(store.get_int("token:b").await.unwrap(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_expires_after_ttl() {
        let store = MemoryStore::new();
        store
            .increment_and_expire("ip:10.0.0.1", Duration::from_secs(3))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get_int("ip:10.0.0.1").await.unwrap(), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get_int("ip:10.0.0.1").await.unwrap(), None);

        // A fresh increment after expiry starts again from zero
        let value = store
            .increment_and_expire("ip:10.0.0.1", Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_refreshes_ttl() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(3);

        store.increment_and_expire("k", ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        store.increment_and_expire("k", ttl).await.unwrap();

        assert_eq!(store.ttl("k"), Some(ttl));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get_int("k").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_zero_ttl_never_persists() {
        let store = MemoryStore::new();
        store.increment_and_expire("k", Duration::ZERO).await.unwrap();
        assert_eq!(store.get_int("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_and_clear() {
        let store = MemoryStore::new();
        store
            .increment_and_expire("short", Duration::from_secs(1))
            .await
            .unwrap();
        store
            .increment_and_expire("long", Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        store.purge_expired();
        assert_eq!(store.entries.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_is_clamped() {
        let store = MemoryStore::new();

        let value = store.increment_and_expire("k", Duration::MAX).await.unwrap();
        assert_eq!(value, 1);
        assert_eq!(store.ttl("k"), Some(MAX_TTL));

        tokio::time::advance(Duration::from_secs(365 * 24 * 60 * 60)).await;
        assert_eq!(store.get_int("k").await.unwrap(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_swept_during_increments() {
        let store = MemoryStore::new();
        store
            .increment_and_expire("stale", Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        for _ in 1..PURGE_INTERVAL {
            store
                .increment_and_expire("busy", Duration::from_secs(60))
                .await
                .unwrap();
        }

        assert_eq!(store.entries.len(), 1);
        assert!(!store.entries.contains_key("stale"));
        assert_eq!(store.get_int("busy").await.unwrap(), Some(PURGE_INTERVAL as i64 - 1));
    }

    #[tokio::test]
    async fn test_clones_share_counters() {
        let store = MemoryStore::new();
        let other = store.clone();

        store
            .increment_and_expire("shared", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(other.get_int("shared").await.unwrap(), Some(1));
    }
}
