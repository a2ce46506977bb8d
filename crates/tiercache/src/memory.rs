//! In-process tier implementations backed by `DashMap`.
//!
//! - [`MemoryLocalTier`]: typed L1 cache. Values are stored as `Arc<dyn Any>`
//!   and cloned out on a hit.
//! - [`MemoryRemoteTier`]: byte store with the remote contract, for
//!   single-instance deployments (no Redis) and tests.
//!
//! Expired entries are dropped lazily on access, or in bulk with
//! `purge_expired()`. Neither tier bounds its size.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::error::{CacheError, CacheResult};
use crate::options::{CacheEntryOptions, ExpiryClock};
use crate::tier::{LocalTier, RemoteTier};

/// Statistics for an in-process tier.
#[derive(Debug, Clone, Default)]
pub struct TierStats {
    /// Number of entries currently held, including not-yet-purged expired ones.
    pub size: usize,
    /// Number of lookups that returned a value.
    pub hits: u64,
    /// Number of lookups that returned nothing.
    pub misses: u64,
    /// Number of entries dropped because they expired.
    pub expirations: u64,
}

impl TierStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl Counters {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn expired(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    fn snapshot(&self, size: usize) -> TierStats {
        TierStats {
            size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

struct LocalEntry {
    value: Arc<dyn Any + Send + Sync>,
    clock: ExpiryClock,
}

/// Typed in-memory cache tier.
#[derive(Default)]
pub struct MemoryLocalTier {
    entries: DashMap<String, LocalEntry>,
    counters: Counters,
}

impl MemoryLocalTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `key` holds an unexpired entry of any type.
    ///
    /// Does not reset the sliding window.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.clock.is_expired(now))
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.clock.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        self.counters.expired(removed as u64);
        removed
    }

    pub fn stats(&self) -> TierStats {
        self.counters.snapshot(self.entries.len())
    }
}

impl LocalTier for MemoryLocalTier {
    fn try_get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let now = Instant::now();

        if self
            .entries
            .remove_if(key, |_, entry| entry.clock.is_expired(now))
            .is_some()
        {
            self.counters.expired(1);
            self.counters.miss();
            return None;
        }

        // A lookup with the wrong type must not reset the sliding window.
        let value = self.entries.get_mut(key).and_then(|mut entry| {
            let value = entry.value.downcast_ref::<T>().cloned()?;
            entry.clock.touch(now);
            Some(value)
        });

        match value {
            Some(_) => self.counters.hit(),
            None => self.counters.miss(),
        }
        value
    }

    fn set<T: Clone + Send + Sync + 'static>(&self, key: &str, value: T, options: &CacheEntryOptions) {
        self.entries.insert(
            key.to_string(),
            LocalEntry {
                value: Arc::new(value),
                clock: ExpiryClock::start(options),
            },
        );
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

struct RemoteEntry {
    bytes: Vec<u8>,
    clock: ExpiryClock,
}

/// In-memory implementation of the remote tier contract.
///
/// An already-cancelled token fails every call with `CacheError::Cancelled`;
/// calls never suspend, so there is nothing to abort mid-flight.
#[derive(Default)]
pub struct MemoryRemoteTier {
    entries: DashMap<String, RemoteEntry>,
    counters: Counters,
}

impl MemoryRemoteTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the raw bytes under `key` without touching its clock or stats.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.clock.is_expired(now))
            .map(|entry| entry.bytes.clone())
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.clock.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        self.counters.expired(removed as u64);
        removed
    }

    pub fn stats(&self) -> TierStats {
        self.counters.snapshot(self.entries.len())
    }

    fn ensure_active(key: &str, cancel: &CancellationToken) -> CacheResult<()> {
        if cancel.is_cancelled() {
            Err(CacheError::cancelled(key))
        } else {
            Ok(())
        }
    }

    /// Removes `key` if expired, then runs `f` on the live entry.
    fn with_live_entry<R>(&self, key: &str, f: impl FnOnce(&mut RemoteEntry, Instant) -> R) -> Option<R> {
        let now = Instant::now();
        if self
            .entries
            .remove_if(key, |_, entry| entry.clock.is_expired(now))
            .is_some()
        {
            self.counters.expired(1);
            return None;
        }
        self.entries.get_mut(key).map(|mut entry| f(&mut *entry, now))
    }
}

#[async_trait]
impl RemoteTier for MemoryRemoteTier {
    async fn get(&self, key: &str, cancel: &CancellationToken) -> CacheResult<Option<Vec<u8>>> {
        Self::ensure_active(key, cancel)?;
        let bytes = self.with_live_entry(key, |entry, now| {
            entry.clock.touch(now);
            entry.bytes.clone()
        });
        match bytes {
            Some(_) => self.counters.hit(),
            None => self.counters.miss(),
        }
        Ok(bytes)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        options: &CacheEntryOptions,
        cancel: &CancellationToken,
    ) -> CacheResult<()> {
        Self::ensure_active(key, cancel)?;
        self.entries.insert(
            key.to_string(),
            RemoteEntry {
                bytes: value,
                clock: ExpiryClock::start(options),
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str, cancel: &CancellationToken) -> CacheResult<()> {
        Self::ensure_active(key, cancel)?;
        self.entries.remove(key);
        Ok(())
    }

    async fn refresh(&self, key: &str, cancel: &CancellationToken) -> CacheResult<()> {
        Self::ensure_active(key, cancel)?;
        self.with_live_entry(key, |entry, now| entry.clock.touch(now));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Session {
        user: String,
    }

    #[test]
    fn test_local_get_set() {
        let tier = MemoryLocalTier::new();
        let session = Session { user: "alice".into() };

        tier.set("session:1", session.clone(), &CacheEntryOptions::new());

        assert_eq!(tier.try_get::<Session>("session:1"), Some(session));
        let stats = tier.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_local_type_mismatch_is_a_miss() {
        let tier = MemoryLocalTier::new();
        tier.set("n", 42u32, &CacheEntryOptions::new());

        assert_eq!(tier.try_get::<String>("n"), None);
        assert_eq!(tier.try_get::<u32>("n"), Some(42));
        assert_eq!(tier.stats().misses, 1);
    }

    #[test]
    fn test_local_type_mismatch_does_not_slide() {
        let tier = MemoryLocalTier::new();
        let options = CacheEntryOptions::new().with_sliding_expiration(Duration::from_millis(100));
        tier.set("n", 42u32, &options);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(tier.try_get::<String>("n"), None);
        std::thread::sleep(Duration::from_millis(60));

        // Only the mismatched lookup happened inside the window.
        assert_eq!(tier.try_get::<u32>("n"), None);
        assert_eq!(tier.stats().expirations, 1);
    }

    #[test]
    fn test_local_remove() {
        let tier = MemoryLocalTier::new();
        tier.set("k", 1u8, &CacheEntryOptions::new());
        assert!(tier.contains_key("k"));

        tier.remove("k");
        assert!(!tier.contains_key("k"));
        assert!(tier.is_empty());

        // Removing again is a no-op.
        tier.remove("k");
    }

    #[test]
    fn test_local_expiration() {
        let tier = MemoryLocalTier::new();
        let options = CacheEntryOptions::new()
            .with_absolute_expiration_relative_to_now(Duration::from_millis(10));
        tier.set("k", 1u8, &options);
        assert_eq!(tier.try_get::<u8>("k"), Some(1));

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(tier.try_get::<u8>("k"), None);
        assert_eq!(tier.len(), 0);
        assert_eq!(tier.stats().expirations, 1);
    }

    #[test]
    fn test_local_purge_expired() {
        let tier = MemoryLocalTier::new();
        let short = CacheEntryOptions::new().with_sliding_expiration(Duration::from_millis(10));
        for i in 0..3 {
            tier.set(&format!("short-{i}"), i, &short);
        }
        tier.set("long", 99, &CacheEntryOptions::new());
        assert_eq!(tier.len(), 4);

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(tier.purge_expired(), 3);
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.stats().expirations, 3);
    }

    #[test]
    fn test_local_clear() {
        let tier = MemoryLocalTier::new();
        for i in 0..5 {
            tier.set(&format!("k{i}"), i, &CacheEntryOptions::new());
        }
        tier.clear();
        assert_eq!(tier.stats().size, 0);
    }

    #[test]
    fn test_hit_rate_calculation() {
        let stats = TierStats {
            size: 10,
            hits: 75,
            misses: 25,
            expirations: 5,
        };
        assert!((stats.hit_rate() - 75.0).abs() < 0.001);
        assert!((TierStats::default().hit_rate() - 0.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_remote_get_set_remove() {
        let tier = MemoryRemoteTier::new();
        let cancel = CancellationToken::new();

        tier.set("k", b"v".to_vec(), &CacheEntryOptions::new(), &cancel)
            .await
            .unwrap();
        assert_eq!(tier.get("k", &cancel).await.unwrap(), Some(b"v".to_vec()));

        tier.remove("k", &cancel).await.unwrap();
        assert_eq!(tier.get("k", &cancel).await.unwrap(), None);

        let stats = tier.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_remote_refresh_extends_sliding_entry() {
        let tier = MemoryRemoteTier::new();
        let cancel = CancellationToken::new();
        let options = CacheEntryOptions::new().with_sliding_expiration(Duration::from_millis(60));
        tier.set("k", b"v".to_vec(), &options, &cancel).await.unwrap();

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tier.refresh("k", &cancel).await.unwrap();
        }
        assert_eq!(tier.peek("k"), Some(b"v".to_vec()));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(tier.peek("k"), None);
        assert_eq!(tier.get("k", &cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remote_refresh_missing_key_is_ok() {
        let tier = MemoryRemoteTier::new();
        assert!(tier.refresh("missing", &CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_remote_honours_cancellation() {
        let tier = MemoryRemoteTier::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tier
            .set("k", b"v".to_vec(), &CacheEntryOptions::new(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(tier.is_empty());
        assert!(tier.get("k", &cancel).await.unwrap_err().is_cancelled());
    }
}
