//! # tiercache
//!
//! Two-tier read-through / write-through cache.
//!
//! ## Architecture
//!
//! - **Local tier**: in-process, typed, microsecond latency, per-instance
//! - **Remote tier**: out-of-process, byte-oriented, shared across instances
//! - **Codec**: the only place where typed values become bytes
//! - **[`CacheManager`]**: sequences tier lookups, the fallback fetch and write-back
//!
//! ```text
//! get → Local ──miss──▶ Remote ──miss──▶ cache.miss ──(get_or_set)──▶ fetch → set both
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use tiercache::{CacheEntryOptions, CacheManager};
//! use tokio_util::sync::CancellationToken;
//!
//! let cache = CacheManager::in_memory();
//! let options = CacheEntryOptions::new().with_sliding_expiration(Duration::from_secs(300));
//! let user = cache
//!     .get_or_set("user:42", &options, |cancel| load_user(42, cancel), &CancellationToken::new())
//!     .await?;
//! ```

pub mod codec;
mod error;
pub mod memory;
pub mod metrics;
mod manager;
mod options;
pub mod telemetry;
pub mod tier;

pub use codec::{Codec, CodecError, CodecFormat};
pub use error::{
    CACHE_MISS_CODE, CANCELLED_CODE, CacheError, CacheResult, ErrorCategory, ErrorDescriptor,
    INVALID_OPTIONS_CODE, REMOTE_FAULT_CODE, SERIALIZATION_CODE, UNKNOWN_VALUE_CODE,
};
pub use manager::{CacheManager, CacheManagerBuilder, StoreFailurePolicy};
pub use memory::{MemoryLocalTier, MemoryRemoteTier, TierStats};
pub use options::CacheEntryOptions;
pub use telemetry::{
    CacheEvent, CacheOperation, CacheTelemetry, NoopTelemetry, TelemetrySpan, TracingTelemetry,
};
pub use tier::{CacheValue, LocalTier, RemoteTier, with_cancellation};

/// Re-exported so callers do not need a direct `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;

/// Type alias for a shared remote tier.
pub type DynRemoteTier = std::sync::Arc<dyn RemoteTier>;
