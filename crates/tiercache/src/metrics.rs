//! Cache counters exported through the `metrics` facade.
//!
//! The library never installs a recorder. Without one these calls are no-ops;
//! a host application that installs a recorder (e.g. Prometheus) gets them for free.

use metrics::counter;

pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "tiercache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "tiercache_misses_total";
    pub const CACHE_FETCHES_TOTAL: &str = "tiercache_fetches_total";
    pub const CACHE_STORE_FAILURES_TOTAL: &str = "tiercache_store_failures_total";
}

pub const LOCAL_TIER: &str = "local";
pub const REMOTE_TIER: &str = "remote";

/// Record a cache hit on `tier`.
pub fn record_cache_hit(tier: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier).increment(1);
}

/// Record a miss on both tiers.
pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// Record a fetch callback invocation.
pub fn record_fetch(outcome: &'static str) {
    counter!(names::CACHE_FETCHES_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a fetched value that could not be stored.
pub fn record_store_failure() {
    counter!(names::CACHE_STORE_FAILURES_TOTAL).increment(1);
}
