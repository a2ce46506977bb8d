//! Observability hooks for cache operations.
//!
//! The orchestrator opens one span per operation and records named events on
//! it. The sink is injected; [`NoopTelemetry`] is the default and the result
//! of an operation never depends on which sink is installed.

use std::sync::Arc;

/// Cache operations that open a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Get,
    Set,
    Remove,
    Refresh,
    GetOrSet,
}

impl CacheOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "cache:get",
            Self::Set => "cache:set",
            Self::Remove => "cache:remove",
            Self::Refresh => "cache:refresh",
            Self::GetOrSet => "cache:getorset",
        }
    }
}

/// Discrete events recorded inside an operation span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEvent {
    HitFromLocal,
    MissFromLocal,
    HitFromRemote,
    MissFromRemote,
    DeserializeFailed,
    GotValue,
    MissedValue,
    FetchedCurrentValue,
    SetCacheWithCurrentValue,
    SetCacheFailed,
    SetMemory,
    SetRemote,
}

impl CacheEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HitFromLocal => "cache:got_from_memory",
            Self::MissFromLocal => "cache:miss_from_memory",
            Self::HitFromRemote => "cache:got_from_remote",
            Self::MissFromRemote => "cache:miss_from_remote",
            Self::DeserializeFailed => "cache:deserialize_failed",
            Self::GotValue => "cache:got_value",
            Self::MissedValue => "cache:missed_value",
            Self::FetchedCurrentValue => "cache:fetched_current_value",
            Self::SetCacheWithCurrentValue => "cache:set_cache_with_current_value",
            Self::SetCacheFailed => "cache:set_cache_failed",
            Self::SetMemory => "cache:set_memory",
            Self::SetRemote => "cache:set_remote",
        }
    }
}

/// An open operation span. Closed when dropped.
pub trait TelemetrySpan: Send {
    fn set_tag(&mut self, name: &'static str, value: &str);

    fn add_event(&mut self, event: CacheEvent);
}

/// Source of operation spans.
pub trait CacheTelemetry: Send + Sync {
    /// Opens a span for `operation` tagged with `key`.
    fn start_span(&self, operation: CacheOperation, key: &str) -> Box<dyn TelemetrySpan>;
}

/// Telemetry sink that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

struct NoopSpan;

impl TelemetrySpan for NoopSpan {
    fn set_tag(&mut self, _name: &'static str, _value: &str) {}

    fn add_event(&mut self, _event: CacheEvent) {}
}

impl CacheTelemetry for NoopTelemetry {
    fn start_span(&self, _operation: CacheOperation, _key: &str) -> Box<dyn TelemetrySpan> {
        Box::new(NoopSpan)
    }
}

/// Telemetry sink that emits `tracing` spans and events.
///
/// Meant to be created once per process and shared by reference. Spans carry
/// `source`, `version`, `operation` and `key`; the `value_type` and `outcome`
/// tags are recorded when set. Other tag names are emitted as debug events.
#[derive(Debug, Clone)]
pub struct TracingTelemetry {
    source: Arc<str>,
    version: Arc<str>,
}

impl TracingTelemetry {
    pub fn new(source: impl Into<Arc<str>>, version: impl Into<Arc<str>>) -> Self {
        Self {
            source: source.into(),
            version: version.into(),
        }
    }

    /// Named after this library and its version.
    pub fn for_library() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

struct TracingSpan {
    span: tracing::Span,
}

impl TelemetrySpan for TracingSpan {
    fn set_tag(&mut self, name: &'static str, value: &str) {
        match name {
            "value_type" | "outcome" => {
                self.span.record(name, value);
            }
            _ => {
                tracing::debug!(parent: &self.span, tag = name, value, "cache tag");
            }
        }
    }

    fn add_event(&mut self, event: CacheEvent) {
        tracing::debug!(parent: &self.span, event = event.as_str(), "cache event");
    }
}

impl CacheTelemetry for TracingTelemetry {
    fn start_span(&self, operation: CacheOperation, key: &str) -> Box<dyn TelemetrySpan> {
        let span = tracing::debug_span!(
            "cache",
            source = %self.source,
            version = %self.version,
            operation = operation.as_str(),
            key = %key,
            value_type = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        Box::new(TracingSpan { span })
    }
}
