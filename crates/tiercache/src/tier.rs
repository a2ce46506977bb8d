//! Contracts for the two cache tiers.
//!
//! ## Local tier
//!
//! Typed, synchronous and non-failing. Values keep their static type, so a
//! lookup with a different type than the one stored is a miss.
//!
//! ## Remote tier
//!
//! Byte-oriented and asynchronous. Calls may fault (transport errors,
//! timeouts) or be cancelled. Timeout policy belongs to the implementation.

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{CacheError, CacheResult};
use crate::options::CacheEntryOptions;

/// Values that can live in both tiers.
pub trait CacheValue:
    serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static
{
}

impl<T> CacheValue for T where
    T: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static
{
}

/// In-process, typed cache tier.
pub trait LocalTier: Send + Sync {
    /// Returns the value stored under `key` if it is present, unexpired and of type `T`.
    fn try_get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T>;

    /// Stores `value` under `key`, replacing any previous entry.
    fn set<T: Clone + Send + Sync + 'static>(&self, key: &str, value: T, options: &CacheEntryOptions);

    /// Removes the entry for `key` if there is one.
    fn remove(&self, key: &str);
}

/// Shared, byte-oriented cache tier.
///
/// Implementations must be thread-safe and should honour the cancellation
/// token by aborting in-flight I/O with `CacheError::Cancelled`.
#[async_trait]
pub trait RemoteTier: Send + Sync {
    /// Reads the bytes stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent. Reading an entry with a
    /// sliding expiration resets its clock.
    async fn get(&self, key: &str, cancel: &CancellationToken) -> CacheResult<Option<Vec<u8>>>;

    /// Writes `value` under `key` with the given expiration.
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        options: &CacheEntryOptions,
        cancel: &CancellationToken,
    ) -> CacheResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str, cancel: &CancellationToken) -> CacheResult<()>;

    /// Resets the sliding expiration clock of `key` without reading its value.
    async fn refresh(&self, key: &str, cancel: &CancellationToken) -> CacheResult<()>;
}

/// Races `fut` against `cancel`.
///
/// Returns `CacheError::Cancelled` for `key` if the token fires first. An
/// already-cancelled token wins without polling `fut`.
pub async fn with_cancellation<T, F>(key: &str, cancel: &CancellationToken, fut: F) -> CacheResult<T>
where
    F: Future<Output = CacheResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CacheError::cancelled(key)),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_with_cancellation_passes_result_through() {
        let cancel = CancellationToken::new();
        let result = with_cancellation("k", &cancel, async { Ok(5) }).await;
        assert_eq!(result, Ok(5));
    }

    #[tokio::test]
    async fn test_with_cancellation_pre_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result =
            with_cancellation("k", &cancel, std::future::pending::<CacheResult<()>>()).await;
        assert_eq!(result, Err(CacheError::cancelled("k")));
    }

    #[test]
    fn test_with_cancellation_wakes_on_cancel() {
        let cancel = CancellationToken::new();
        let mut fut = tokio_test::task::spawn(with_cancellation(
            "k",
            &cancel,
            std::future::pending::<CacheResult<()>>(),
        ));

        tokio_test::assert_pending!(fut.poll());
        cancel.cancel();
        assert!(fut.is_woken());
        let result = tokio_test::assert_ready!(fut.poll());
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_cancellation_aborts_in_flight() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result: CacheResult<()> = with_cancellation("slow", &cancel, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert!(result.unwrap_err().is_cancelled());
    }
}
