//! Two-tier cache orchestration.
//!
//! ## Lookup order
//!
//! ```text
//! get(key) → local tier ──hit──▶ value
//!                │ miss
//!                ▼
//!            remote tier ──hit──▶ decode ──▶ value (local tier not populated)
//!                │ miss
//!                ▼
//!            cache.miss ──(get_or_set only)──▶ fetch ──▶ set both tiers
//! ```
//!
//! Every tier call is attempted at most once per operation. Concurrent misses
//! on the same key may each run their fetch; the last write wins.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::codec::Codec;
use crate::error::{CacheError, CacheResult};
use crate::memory::{MemoryLocalTier, MemoryRemoteTier};
use crate::metrics;
use crate::options::CacheEntryOptions;
use crate::telemetry::{CacheEvent, CacheOperation, CacheTelemetry, NoopTelemetry, TelemetrySpan};
use crate::tier::{CacheValue, LocalTier, RemoteTier};

/// What `get_or_set` does when a freshly fetched value cannot be stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Log the failure and return the fetched value anyway.
    #[default]
    BestEffort,
    /// Return the store error instead of the fetched value.
    Propagate,
}

/// Typed facade over a local tier and a remote tier.
///
/// Cheap to clone; clones share both tiers.
pub struct CacheManager<L: LocalTier = MemoryLocalTier> {
    local: Arc<L>,
    remote: Arc<dyn RemoteTier>,
    codec: Codec,
    telemetry: Arc<dyn CacheTelemetry>,
    store_failure_policy: StoreFailurePolicy,
}

impl<L: LocalTier> Clone for CacheManager<L> {
    fn clone(&self) -> Self {
        Self {
            local: Arc::clone(&self.local),
            remote: Arc::clone(&self.remote),
            codec: self.codec,
            telemetry: Arc::clone(&self.telemetry),
            store_failure_policy: self.store_failure_policy,
        }
    }
}

impl CacheManager<MemoryLocalTier> {
    /// Manager whose both tiers live in this process.
    pub fn in_memory() -> Self {
        Self::builder(
            Arc::new(MemoryLocalTier::new()),
            Arc::new(MemoryRemoteTier::new()),
        )
        .build()
    }
}

impl<L: LocalTier> CacheManager<L> {
    pub fn builder(local: Arc<L>, remote: Arc<dyn RemoteTier>) -> CacheManagerBuilder<L> {
        CacheManagerBuilder::new(local, remote)
    }

    pub fn local(&self) -> &Arc<L> {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn RemoteTier> {
        &self.remote
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn store_failure_policy(&self) -> StoreFailurePolicy {
        self.store_failure_policy
    }

    pub fn telemetry(&self) -> &Arc<dyn CacheTelemetry> {
        &self.telemetry
    }

    /// Gets the value stored under `key`.
    ///
    /// A local hit never reaches the remote tier. A remote hit is decoded and
    /// returned but not copied into the local tier.
    ///
    /// # Errors
    ///
    /// - `CacheError::Miss` if neither tier holds the key.
    /// - `CacheError::UnknownValue` if the remote bytes do not decode to `T`
    ///   or decode to null.
    /// - Remote faults and cancellation, unchanged.
    pub async fn get<T: CacheValue>(&self, key: &str, cancel: &CancellationToken) -> CacheResult<T> {
        let mut span = self.telemetry.start_span(CacheOperation::Get, key);
        span.set_tag("value_type", std::any::type_name::<T>());

        let result = self.get_inner(key, cancel, span.as_mut()).await;
        record_outcome(span.as_mut(), &result);
        result
    }

    async fn get_inner<T: CacheValue>(
        &self,
        key: &str,
        cancel: &CancellationToken,
        span: &mut dyn TelemetrySpan,
    ) -> CacheResult<T> {
        if let Some(value) = self.local.try_get::<T>(key) {
            span.add_event(CacheEvent::HitFromLocal);
            metrics::record_cache_hit(metrics::LOCAL_TIER);
            tracing::debug!(key = %key, "cache hit (local)");
            return Ok(value);
        }
        span.add_event(CacheEvent::MissFromLocal);

        let Some(bytes) = self.remote.get(key, cancel).await? else {
            span.add_event(CacheEvent::MissFromRemote);
            metrics::record_cache_miss();
            tracing::debug!(key = %key, "cache miss");
            return Err(CacheError::miss(key));
        };
        span.add_event(CacheEvent::HitFromRemote);
        metrics::record_cache_hit(metrics::REMOTE_TIER);
        tracing::debug!(key = %key, "cache hit (remote)");

        match self.codec.decode::<T>(&bytes) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => {
                span.add_event(CacheEvent::DeserializeFailed);
                tracing::warn!(key = %key, "cached value decoded to null");
                Err(CacheError::unknown_value::<T>(key, None))
            }
            Err(e) => {
                span.add_event(CacheEvent::DeserializeFailed);
                tracing::warn!(key = %key, error = %e, "failed to decode cached value");
                Err(CacheError::unknown_value::<T>(key, Some(e.to_string())))
            }
        }
    }

    /// Stores `value` in both tiers with the same expiration options.
    ///
    /// The local write happens first and unconditionally, so the value is
    /// visible locally even when the remote write fails.
    ///
    /// # Errors
    ///
    /// - `CacheError::InvalidOptions` before any tier is touched.
    /// - `CacheError::Serialization` if the value cannot be encoded.
    /// - Remote faults and cancellation, unchanged.
    pub async fn set<T: CacheValue>(
        &self,
        key: &str,
        value: &T,
        options: &CacheEntryOptions,
        cancel: &CancellationToken,
    ) -> CacheResult<()> {
        let mut span = self.telemetry.start_span(CacheOperation::Set, key);
        span.set_tag("value_type", std::any::type_name::<T>());

        let result = self.set_inner(key, value, options, cancel, span.as_mut()).await;
        record_outcome(span.as_mut(), &result);
        result
    }

    async fn set_inner<T: CacheValue>(
        &self,
        key: &str,
        value: &T,
        options: &CacheEntryOptions,
        cancel: &CancellationToken,
        span: &mut dyn TelemetrySpan,
    ) -> CacheResult<()> {
        options.validate(OffsetDateTime::now_utc())?;

        self.local.set(key, value.clone(), options);
        span.add_event(CacheEvent::SetMemory);

        let bytes = self
            .codec
            .encode(value)
            .map_err(|e| CacheError::serialization(key, e.to_string()))?;
        self.remote.set(key, bytes, options, cancel).await?;
        span.add_event(CacheEvent::SetRemote);

        tracing::debug!(key = %key, "cache set (local+remote)");
        Ok(())
    }

    /// Removes `key` from both tiers.
    ///
    /// The local entry is always removed first. If the remote call fails, the
    /// remote copy may still exist.
    pub async fn remove(&self, key: &str, cancel: &CancellationToken) -> CacheResult<()> {
        let mut span = self.telemetry.start_span(CacheOperation::Remove, key);

        self.local.remove(key);
        let result = self.remote.remove(key, cancel).await;
        if let Err(e) = &result {
            tracing::warn!(key = %key, error = %e, "remote remove failed");
        }

        record_outcome(span.as_mut(), &result);
        result
    }

    /// Resets the sliding expiration of the remote entry.
    ///
    /// The local tier keeps its own clock and is not touched.
    pub async fn refresh(&self, key: &str, cancel: &CancellationToken) -> CacheResult<()> {
        let mut span = self.telemetry.start_span(CacheOperation::Refresh, key);

        let result = self.remote.refresh(key, cancel).await;

        record_outcome(span.as_mut(), &result);
        result
    }

    /// Gets the value for `key`, computing and storing it on a miss.
    ///
    /// `fetch` runs only when [`get`](Self::get) reports `CacheError::Miss`.
    /// Any other failure is returned as-is. A fetched `Some(value)` is
    /// written to both tiers with `options`; a fetched `None` is passed
    /// through without caching; a fetch error is returned unchanged.
    ///
    /// Invalid `options` fail with `CacheError::InvalidOptions` before either
    /// tier is read. When storing the fetched value fails, the outcome
    /// follows the manager's [`StoreFailurePolicy`].
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: &str,
        options: &CacheEntryOptions,
        fetch: F,
        cancel: &CancellationToken,
    ) -> CacheResult<Option<T>>
    where
        T: CacheValue,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = CacheResult<Option<T>>>,
    {
        let mut span = self.telemetry.start_span(CacheOperation::GetOrSet, key);
        span.set_tag("value_type", std::any::type_name::<T>());

        let result = self
            .get_or_set_inner(key, options, fetch, cancel, span.as_mut())
            .await;
        record_outcome(span.as_mut(), &result);
        result
    }

    async fn get_or_set_inner<T, F, Fut>(
        &self,
        key: &str,
        options: &CacheEntryOptions,
        fetch: F,
        cancel: &CancellationToken,
        span: &mut dyn TelemetrySpan,
    ) -> CacheResult<Option<T>>
    where
        T: CacheValue,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = CacheResult<Option<T>>>,
    {
        // Rejected before any tier is read.
        options.validate(OffsetDateTime::now_utc())?;

        match self.get::<T>(key, cancel).await {
            Ok(value) => {
                span.add_event(CacheEvent::GotValue);
                return Ok(Some(value));
            }
            Err(e) if e.is_miss() => span.add_event(CacheEvent::MissedValue),
            Err(e) => return Err(e),
        }

        let fetched = fetch(cancel.clone()).await;
        span.add_event(CacheEvent::FetchedCurrentValue);

        let value = match &fetched {
            Ok(Some(value)) => {
                metrics::record_fetch("value");
                value
            }
            Ok(None) => {
                metrics::record_fetch("empty");
                tracing::debug!(key = %key, "fetch returned no value, not caching");
                return fetched;
            }
            Err(e) => {
                metrics::record_fetch("error");
                tracing::debug!(key = %key, error = %e, "fetch failed");
                return fetched;
            }
        };

        match self.set(key, value, options, cancel).await {
            Ok(()) => span.add_event(CacheEvent::SetCacheWithCurrentValue),
            Err(e) => {
                span.add_event(CacheEvent::SetCacheFailed);
                metrics::record_store_failure();
                match self.store_failure_policy {
                    StoreFailurePolicy::BestEffort => {
                        tracing::warn!(key = %key, error = %e, "failed to cache fetched value");
                    }
                    StoreFailurePolicy::Propagate => return Err(e),
                }
            }
        }

        fetched
    }
}

fn record_outcome<T>(span: &mut dyn TelemetrySpan, result: &CacheResult<T>) {
    match result {
        Ok(_) => span.set_tag("outcome", "ok"),
        Err(e) => span.set_tag("outcome", e.code()),
    }
}

/// Assembles a [`CacheManager`].
pub struct CacheManagerBuilder<L: LocalTier> {
    local: Arc<L>,
    remote: Arc<dyn RemoteTier>,
    codec: Codec,
    telemetry: Arc<dyn CacheTelemetry>,
    store_failure_policy: StoreFailurePolicy,
}

impl<L: LocalTier> CacheManagerBuilder<L> {
    pub fn new(local: Arc<L>, remote: Arc<dyn RemoteTier>) -> Self {
        Self {
            local,
            remote,
            codec: Codec::default(),
            telemetry: Arc::new(NoopTelemetry),
            store_failure_policy: StoreFailurePolicy::default(),
        }
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn CacheTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn store_failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
        self.store_failure_policy = policy;
        self
    }

    pub fn build(self) -> CacheManager<L> {
        CacheManager {
            local: self.local,
            remote: self.remote,
            codec: self.codec,
            telemetry: self.telemetry,
            store_failure_policy: self.store_failure_policy,
        }
    }
}
