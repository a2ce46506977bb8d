use serde::{Deserialize, Serialize};
use tiercache::{CodecFormat, StoreFailurePolicy};

/// Process-level cache configuration.
///
/// Every section falls back to its defaults, so an empty file (or no file at
/// all) yields a working in-process cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierCacheConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TierCacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Redis validations
        if self.redis.url.trim().is_empty() {
            return Err("redis.url must not be empty".into());
        }
        if self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        if self.redis.timeout_ms == 0 {
            return Err("redis.timeout_ms must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        if self.cache.telemetry_enabled && self.cache.telemetry_source.trim().is_empty() {
            return Err("cache.telemetry_enabled=true requires cache.telemetry_source".into());
        }
        Ok(())
    }
}

/// Redis configuration for the shared tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis. Without it the remote tier lives in this process.
    /// Default: false
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Per-command timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Prefix prepended to every key, so several applications can share a database
    #[serde(default)]
    pub instance_name: String,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            instance_name: String::new(),
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Serialization format for the remote tier ("json" or "messagepack")
    #[serde(default)]
    pub codec: CodecFormat,

    /// What get_or_set does when a fetched value cannot be stored
    #[serde(default)]
    pub store_failure_policy: StoreFailurePolicy,

    #[serde(default = "default_telemetry_enabled")]
    pub telemetry_enabled: bool,

    /// Name attached to every telemetry span
    #[serde(default = "default_telemetry_source")]
    pub telemetry_source: String,
}

fn default_telemetry_enabled() -> bool {
    true
}

fn default_telemetry_source() -> String {
    "tiercache".into()
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            codec: CodecFormat::default(),
            store_failure_policy: StoreFailurePolicy::default(),
            telemetry_enabled: default_telemetry_enabled(),
            telemetry_source: default_telemetry_source(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::TierCacheConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub const DEFAULT_CONFIG_FILE: &str = "tiercache.toml";

    pub fn load_config(path: Option<&str>) -> Result<TierCacheConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            tracing::warn!(path = %pathbuf.display(), "config file not found, using defaults");
        }
        // Environment variable overrides, e.g., TIERCACHE__REDIS__URL=redis://cache:6379
        builder = builder.add_source(
            Environment::with_prefix("TIERCACHE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: TierCacheConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_from_path<P: AsRef<Path>>(path: P) -> Result<TierCacheConfig, String> {
        let p = path.as_ref().to_string_lossy().to_string();
        load_config(Some(&p))
    }
}
