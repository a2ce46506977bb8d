//! Scripted tiers and a recording telemetry sink shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tiercache::{
    CacheEntryOptions, CacheError, CacheEvent, CacheManager, CacheOperation, CacheResult,
    CacheTelemetry, CancellationToken, LocalTier, MemoryLocalTier, MemoryRemoteTier, RemoteTier,
    TelemetrySpan,
};

/// Remote tier backed by `MemoryRemoteTier` that counts calls, records write
/// options and can be told to fault.
#[derive(Default)]
pub struct ScriptedRemoteTier {
    inner: MemoryRemoteTier,
    pub get_calls: AtomicUsize,
    pub set_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_remove: AtomicBool,
    pub fail_refresh: AtomicBool,
    pub last_set: Mutex<Option<(String, Vec<u8>, CacheEntryOptions)>>,
}

impl ScriptedRemoteTier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stores raw bytes without going through the counters.
    pub async fn seed(&self, key: &str, bytes: &[u8]) {
        self.inner
            .set(key, bytes.to_vec(), &CacheEntryOptions::new(), &CancellationToken::new())
            .await
            .expect("seed remote tier");
    }

    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.peek(key)
    }

    pub fn calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
            + self.set_calls.load(Ordering::SeqCst)
            + self.remove_calls.load(Ordering::SeqCst)
            + self.refresh_calls.load(Ordering::SeqCst)
    }

    fn fault(flag: &AtomicBool, key: &str) -> CacheResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(CacheError::remote_fault(key, "scripted fault"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteTier for ScriptedRemoteTier {
    async fn get(&self, key: &str, cancel: &CancellationToken) -> CacheResult<Option<Vec<u8>>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Self::fault(&self.fail_get, key)?;
        self.inner.get(key, cancel).await
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        options: &CacheEntryOptions,
        cancel: &CancellationToken,
    ) -> CacheResult<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        Self::fault(&self.fail_set, key)?;
        *self.last_set.lock().unwrap() = Some((key.to_string(), value.clone(), *options));
        self.inner.set(key, value, options, cancel).await
    }

    async fn remove(&self, key: &str, cancel: &CancellationToken) -> CacheResult<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        Self::fault(&self.fail_remove, key)?;
        self.inner.remove(key, cancel).await
    }

    async fn refresh(&self, key: &str, cancel: &CancellationToken) -> CacheResult<()> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Self::fault(&self.fail_refresh, key)?;
        self.inner.refresh(key, cancel).await
    }
}

/// Local tier that records writes and removals before delegating.
#[derive(Default)]
pub struct RecordingLocalTier {
    pub inner: MemoryLocalTier,
    pub sets: Mutex<Vec<(String, CacheEntryOptions)>>,
    pub removes: Mutex<Vec<String>>,
}

impl RecordingLocalTier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl LocalTier for RecordingLocalTier {
    fn try_get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        self.inner.try_get(key)
    }

    fn set<T: Clone + Send + Sync + 'static>(&self, key: &str, value: T, options: &CacheEntryOptions) {
        self.sets.lock().unwrap().push((key.to_string(), *options));
        self.inner.set(key, value, options);
    }

    fn remove(&self, key: &str) {
        self.removes.lock().unwrap().push(key.to_string());
        self.inner.remove(key);
    }
}

/// One finished span as seen by [`RecordingTelemetry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSpan {
    pub operation: CacheOperation,
    pub key: String,
    pub tags: Vec<(&'static str, String)>,
    pub events: Vec<CacheEvent>,
}

impl RecordedSpan {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Telemetry sink that keeps every span in memory, in the order they close.
#[derive(Default, Clone)]
pub struct RecordingTelemetry {
    spans: Arc<Mutex<Vec<RecordedSpan>>>,
}

impl RecordingTelemetry {
    pub fn spans(&self) -> Vec<RecordedSpan> {
        self.spans.lock().unwrap().clone()
    }

    pub fn span(&self, operation: CacheOperation) -> RecordedSpan {
        self.spans()
            .into_iter()
            .find(|s| s.operation == operation)
            .unwrap_or_else(|| panic!("no {operation:?} span recorded"))
    }
}

struct RecordingSpan {
    record: RecordedSpan,
    sink: Arc<Mutex<Vec<RecordedSpan>>>,
}

impl TelemetrySpan for RecordingSpan {
    fn set_tag(&mut self, name: &'static str, value: &str) {
        self.record.tags.push((name, value.to_string()));
    }

    fn add_event(&mut self, event: CacheEvent) {
        self.record.events.push(event);
    }
}

impl Drop for RecordingSpan {
    fn drop(&mut self) {
        self.sink.lock().unwrap().push(self.record.clone());
    }
}

impl CacheTelemetry for RecordingTelemetry {
    fn start_span(&self, operation: CacheOperation, key: &str) -> Box<dyn TelemetrySpan> {
        Box::new(RecordingSpan {
            record: RecordedSpan {
                operation,
                key: key.to_string(),
                tags: Vec::new(),
                events: Vec::new(),
            },
            sink: Arc::clone(&self.spans),
        })
    }
}

/// Manager over a recording local tier and a scripted remote tier.
pub struct Harness {
    pub cache: CacheManager<RecordingLocalTier>,
    pub local: Arc<RecordingLocalTier>,
    pub remote: Arc<ScriptedRemoteTier>,
    pub telemetry: RecordingTelemetry,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|builder| builder)
    }

    pub fn with(
        configure: impl FnOnce(
            tiercache::CacheManagerBuilder<RecordingLocalTier>,
        ) -> tiercache::CacheManagerBuilder<RecordingLocalTier>,
    ) -> Self {
        let local = RecordingLocalTier::new();
        let remote = ScriptedRemoteTier::new();
        let telemetry = RecordingTelemetry::default();
        let builder = CacheManager::builder(Arc::clone(&local), remote.clone())
            .telemetry(Arc::new(telemetry.clone()));
        Self {
            cache: configure(builder).build(),
            local,
            remote,
            telemetry,
        }
    }
}
