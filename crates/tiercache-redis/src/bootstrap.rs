//! Builds a ready [`CacheManager`] from [`TierCacheConfig`].

use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::{PoolConfig, Runtime};
use tiercache::{CacheManager, Codec, DynRemoteTier, MemoryLocalTier, MemoryRemoteTier};

use crate::config::{RedisConfig, TierCacheConfig};
use crate::observability::cache_telemetry;
use crate::remote::RedisRemoteTier;

/// Creates the remote tier described by `config`.
///
/// Redis is used only when it is enabled and the first connection succeeds.
/// Otherwise the remote tier lives in this process, so the cache keeps
/// working as a single-instance cache.
pub async fn create_remote_tier(config: &RedisConfig) -> DynRemoteTier {
    if !config.enabled {
        tracing::info!("Redis disabled, using in-process remote tier");
        return Arc::new(MemoryRemoteTier::new());
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let timeout = Duration::from_millis(config.timeout_ms);
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to in-process remote tier."
            );
            return Arc::new(MemoryRemoteTier::new());
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!(instance_name = %config.instance_name, "Connected to Redis");
            Arc::new(RedisRemoteTier::new(
                pool,
                config.instance_name.clone(),
                timeout,
            ))
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-process remote tier."
            );
            Arc::new(MemoryRemoteTier::new())
        }
    }
}

/// Assembles a manager over a fresh local tier and the configured remote tier.
///
/// Every manager built here shares the process-wide telemetry sink from
/// [`cache_telemetry`].
pub async fn build_cache_manager(config: &TierCacheConfig) -> CacheManager {
    let remote = create_remote_tier(&config.redis).await;
    CacheManager::builder(Arc::new(MemoryLocalTier::new()), remote)
        .codec(Codec::new(config.cache.codec))
        .telemetry(cache_telemetry(&config.cache))
        .store_failure_policy(config.cache.store_failure_policy)
        .build()
}
