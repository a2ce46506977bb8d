//! Process-wide observability for services embedding the cache.
//!
//! - A `tracing` subscriber whose level comes from [`LoggingConfig`] and can
//!   be changed at runtime. `RUST_LOG` overrides the configured level.
//! - The cache telemetry sink. Managers never create one themselves; the sink
//!   is built on first use and the same handle is injected into every
//!   [`CacheManager`](tiercache::CacheManager) in the process.

use std::sync::{Arc, OnceLock};

use tiercache::{CacheTelemetry, NoopTelemetry, TracingTelemetry};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

use crate::config::{CacheSettings, LoggingConfig};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

static CACHE_TELEMETRY: OnceLock<Arc<dyn CacheTelemetry>> = OnceLock::new();

/// Installs the global subscriber at the level from `logging`.
pub fn init_tracing(logging: &LoggingConfig) {
    init_tracing_with_level(&logging.level);
}

/// Installs the global subscriber. Later calls keep the first subscriber.
pub fn init_tracing_with_level(level: &str) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::new(level),
    };

    let (reload_layer, handle) = reload::Layer::new(filter);
    if LOG_RELOAD_HANDLE.set(handle).is_err() {
        return;
    }

    if tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
    {
        tracing::debug!(level, "tracing initialised");
    }
}

/// Changes the active log level. No-op before [`init_tracing`].
pub fn apply_logging_level(level: &str) {
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        match handle.modify(|f| *f = EnvFilter::new(level)) {
            Ok(()) => tracing::info!(level, "log level changed"),
            Err(e) => tracing::warn!(error = %e, "failed to change log level"),
        }
    }
}

/// Process-wide telemetry sink.
///
/// The first call builds the sink from `settings`; every later call returns
/// the same handle, whatever settings it is given.
pub fn cache_telemetry(settings: &CacheSettings) -> Arc<dyn CacheTelemetry> {
    Arc::clone(CACHE_TELEMETRY.get_or_init(|| new_cache_telemetry(settings)))
}

/// Builds a fresh sink for `settings` without touching the process-wide one.
pub fn new_cache_telemetry(settings: &CacheSettings) -> Arc<dyn CacheTelemetry> {
    if !settings.telemetry_enabled {
        return Arc::new(NoopTelemetry);
    }
    Arc::new(TracingTelemetry::new(
        settings.telemetry_source.as_str(),
        env!("CARGO_PKG_VERSION"),
    ))
}
