//! # tiercache-redis
//!
//! Redis remote tier and process wiring for [`tiercache`].
//!
//! - [`RedisRemoteTier`]: entries stored as Redis hashes through a `deadpool-redis` pool
//! - [`config`]: `tiercache.toml` plus `TIERCACHE__*` environment overrides
//! - [`observability`]: tracing subscriber and the shared telemetry sink
//! - [`bootstrap`]: builds a [`CacheManager`](tiercache::CacheManager) with
//!   graceful fallback to an in-process remote tier
//!
//! ```ignore
//! let config = tiercache_redis::config::loader::load_config(None)?;
//! tiercache_redis::observability::init_tracing(&config.logging);
//! let cache = tiercache_redis::build_cache_manager(&config).await;
//! ```

pub mod bootstrap;
pub mod config;
pub mod observability;
pub mod remote;

pub use bootstrap::{build_cache_manager, create_remote_tier};
pub use config::{CacheSettings, LoggingConfig, RedisConfig, TierCacheConfig};
pub use remote::RedisRemoteTier;
