//! Redis-backed remote tier.
//!
//! ## Storage layout
//!
//! Each entry is a hash at `{instance_name}{key}`:
//!
//! | Field    | Value                                          |
//! |----------|------------------------------------------------|
//! | `absexp` | absolute deadline, unix milliseconds, or `-1`  |
//! | `sldexp` | sliding window in milliseconds, or `-1`        |
//! | `data`   | encoded value                                  |
//!
//! The key TTL always equals `min(sliding, absolute - now)` so Redis expires
//! the hash on its own. Reads and refreshes of a sliding entry reset the TTL.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;
use time::OffsetDateTime;
use tiercache::{
    CacheEntryOptions, CacheError, CacheResult, CancellationToken, RemoteTier, with_cancellation,
};

const ABSOLUTE_EXPIRATION_FIELD: &str = "absexp";
const SLIDING_EXPIRATION_FIELD: &str = "sldexp";
const DATA_FIELD: &str = "data";
const NOT_PRESENT: i64 = -1;

#[derive(Debug, thiserror::Error)]
enum RedisTierError {
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Redis command error: {0}")]
    Command(#[from] redis::RedisError),
}

/// Remote tier stored in Redis through a `deadpool-redis` pool.
#[derive(Clone)]
pub struct RedisRemoteTier {
    pool: Pool,
    instance_name: String,
    timeout: Duration,
}

impl RedisRemoteTier {
    /// Creates a tier over `pool`.
    ///
    /// `instance_name` is prepended to every key and `timeout` bounds each
    /// call, connection checkout included.
    pub fn new(pool: Pool, instance_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            pool,
            instance_name: instance_name.into(),
            timeout,
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Check if Redis answers a `PING`.
    pub async fn is_available(&self) -> bool {
        let probe = async {
            let mut conn = self.pool.get().await?;
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, RedisTierError>(pong)
        };
        matches!(tokio::time::timeout(self.timeout, probe).await, Ok(Ok(_)))
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.instance_name, key)
    }

    /// Runs one Redis operation under the configured timeout and `cancel`.
    async fn guarded<T>(
        &self,
        key: &str,
        cancel: &CancellationToken,
        op: impl Future<Output = Result<T, RedisTierError>>,
    ) -> CacheResult<T> {
        let timed = async {
            match tokio::time::timeout(self.timeout, op).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => {
                    tracing::warn!(key = %key, error = %e, "Redis operation failed");
                    Err(CacheError::remote_fault(key, e.to_string()))
                }
                Err(_) => {
                    tracing::warn!(key = %key, timeout_ms = self.timeout.as_millis() as u64, "Redis operation timed out");
                    Err(CacheError::remote_fault(
                        key,
                        format!("timed out after {} ms", self.timeout.as_millis()),
                    ))
                }
            }
        };
        with_cancellation(key, cancel, timed).await
    }

    async fn fetch(&self, redis_key: &str) -> Result<Option<Vec<u8>>, RedisTierError> {
        let mut conn = self.pool.get().await?;
        let (absolute, sliding, data): (Option<i64>, Option<i64>, Option<Vec<u8>>) =
            redis::cmd("HMGET")
                .arg(redis_key)
                .arg(ABSOLUTE_EXPIRATION_FIELD)
                .arg(SLIDING_EXPIRATION_FIELD)
                .arg(DATA_FIELD)
                .query_async(&mut conn)
                .await?;

        let Some(data) = data else {
            return Ok(None);
        };
        // A failed TTL reset does not turn a hit into a fault.
        if let Err(e) = slide(&mut conn, redis_key, absolute, sliding).await {
            tracing::warn!(key = %redis_key, error = %e, "failed to reset sliding expiration");
        }
        Ok(Some(data))
    }

    async fn store(
        &self,
        redis_key: &str,
        value: Vec<u8>,
        absolute: Option<i64>,
        sliding: Option<i64>,
        ttl: Option<i64>,
    ) -> Result<(), RedisTierError> {
        let mut conn = self.pool.get().await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(redis_key, ABSOLUTE_EXPIRATION_FIELD, absolute.unwrap_or(NOT_PRESENT))
            .ignore()
            .hset(redis_key, SLIDING_EXPIRATION_FIELD, sliding.unwrap_or(NOT_PRESENT))
            .ignore()
            .hset(redis_key, DATA_FIELD, value)
            .ignore();
        match ttl {
            Some(ttl) => pipe.pexpire(redis_key, ttl).ignore(),
            None => pipe.persist(redis_key).ignore(),
        };

        let (): () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, redis_key: &str) -> Result<(), RedisTierError> {
        let mut conn = self.pool.get().await?;
        let (): () = conn.del(redis_key).await?;
        Ok(())
    }

    async fn touch(&self, redis_key: &str) -> Result<(), RedisTierError> {
        let mut conn = self.pool.get().await?;
        let (absolute, sliding): (Option<i64>, Option<i64>) = redis::cmd("HMGET")
            .arg(redis_key)
            .arg(ABSOLUTE_EXPIRATION_FIELD)
            .arg(SLIDING_EXPIRATION_FIELD)
            .query_async(&mut conn)
            .await?;
        slide(&mut conn, redis_key, absolute, sliding).await
    }
}

/// Resets the TTL of a sliding entry. Entries without a sliding window keep
/// their TTL.
async fn slide(
    conn: &mut Connection,
    redis_key: &str,
    absolute: Option<i64>,
    sliding: Option<i64>,
) -> Result<(), RedisTierError> {
    let (absolute, sliding) = (stored(absolute), stored(sliding));
    if sliding.is_none() {
        return Ok(());
    }
    if let Some(ttl) = expiry_ttl(absolute, sliding, unix_millis(OffsetDateTime::now_utc())) {
        let (): () = conn.pexpire(redis_key, ttl).await?;
    }
    Ok(())
}

fn stored(field: Option<i64>) -> Option<i64> {
    field.filter(|v| *v != NOT_PRESENT)
}

/// TTL in milliseconds for an entry with the given deadline and window.
///
/// The sliding window never extends the entry beyond its absolute deadline.
/// `None` means the entry does not expire.
pub fn expiry_ttl(absolute_ms: Option<i64>, sliding_ms: Option<i64>, now_ms: i64) -> Option<i64> {
    let remaining = absolute_ms.map(|deadline| deadline.saturating_sub(now_ms));
    match (remaining, sliding_ms) {
        (Some(remaining), Some(sliding)) => Some(remaining.min(sliding)),
        (Some(remaining), None) => Some(remaining),
        (None, sliding) => sliding,
    }
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl RemoteTier for RedisRemoteTier {
    async fn get(&self, key: &str, cancel: &CancellationToken) -> CacheResult<Option<Vec<u8>>> {
        let redis_key = self.redis_key(key);
        let result = self.guarded(key, cancel, self.fetch(&redis_key)).await?;
        tracing::debug!(key = %key, hit = result.is_some(), "Redis GET");
        Ok(result)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        options: &CacheEntryOptions,
        cancel: &CancellationToken,
    ) -> CacheResult<()> {
        let now = OffsetDateTime::now_utc();
        let absolute = options.absolute_deadline(now).map(unix_millis);
        let sliding = options.sliding_expiration.map(duration_millis);
        let ttl = expiry_ttl(absolute, sliding, unix_millis(now));

        let redis_key = self.redis_key(key);
        self.guarded(key, cancel, self.store(&redis_key, value, absolute, sliding, ttl))
            .await?;
        tracing::debug!(key = %key, ttl_ms = ?ttl, "Redis SET");
        Ok(())
    }

    async fn remove(&self, key: &str, cancel: &CancellationToken) -> CacheResult<()> {
        let redis_key = self.redis_key(key);
        self.guarded(key, cancel, self.delete(&redis_key)).await
    }

    async fn refresh(&self, key: &str, cancel: &CancellationToken) -> CacheResult<()> {
        let redis_key = self.redis_key(key);
        self.guarded(key, cancel, self.touch(&redis_key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deadpool_redis::{Config, Runtime};

    fn unreachable_tier() -> RedisRemoteTier {
        // Port 1 is never a Redis server; connections are refused immediately.
        let pool = Config::from_url("redis://127.0.0.1:1")
            .create_pool(Some(Runtime::Tokio1))
            .unwrap();
        RedisRemoteTier::new(pool, "app:", Duration::from_millis(500))
    }

    #[test]
    fn test_expiry_ttl() {
        let now = 1_000_000;

        assert_eq!(expiry_ttl(None, None, now), None);
        assert_eq!(expiry_ttl(None, Some(5_000), now), Some(5_000));
        assert_eq!(expiry_ttl(Some(now + 60_000), None, now), Some(60_000));
        // Sliding never outlives the absolute deadline.
        assert_eq!(expiry_ttl(Some(now + 2_000), Some(5_000), now), Some(2_000));
        assert_eq!(expiry_ttl(Some(now + 60_000), Some(5_000), now), Some(5_000));
    }

    #[test]
    fn test_stored_fields() {
        assert_eq!(stored(Some(NOT_PRESENT)), None);
        assert_eq!(stored(None), None);
        assert_eq!(stored(Some(30_000)), Some(30_000));
    }

    #[test]
    fn test_time_conversions() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(unix_millis(at), 1_700_000_000_000);
        assert_eq!(duration_millis(Duration::from_secs(2)), 2_000);
        assert_eq!(duration_millis(Duration::MAX), i64::MAX);
    }

    #[tokio::test]
    async fn test_keys_are_prefixed() {
        let tier = unreachable_tier();
        assert_eq!(tier.instance_name(), "app:");
        assert_eq!(tier.redis_key("user:1"), "app:user:1");
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_a_remote_fault() {
        let tier = unreachable_tier();
        let cancel = CancellationToken::new();

        assert!(!tier.is_available().await);

        let err = tier.get("user:1", &cancel).await.unwrap_err();
        assert_eq!(err.code(), "cache.remote_fault");
        assert_eq!(err.context(), Some("user:1"));
    }

    #[tokio::test]
    async fn test_cancelled_call_never_reaches_redis() {
        let tier = unreachable_tier();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tier
            .set("k", b"1".to_vec(), &CacheEntryOptions::new(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
