//! Resolution metrics.
//!
//! Counters for each way a resolve can end, plus provider traffic. One
//! instance lives inside each [`crate::resolver::Resolver`].

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct ResolveMetrics {
    /// Resolves answered by an exact override
    override_hits: AtomicUsize,

    /// Resolves answered from the cache
    cache_hits: AtomicUsize,

    /// Cache lookups that missed (absent, stale or unreadable)
    cache_misses: AtomicUsize,

    /// Requests issued to providers, across both tiers
    provider_calls: AtomicUsize,

    /// Provider requests that came back with a failure classification
    provider_failures: AtomicUsize,

    /// Resolves where every provider failed
    exhausted: AtomicUsize,
}

impl ResolveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_override_hit(&self) {
        self.override_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_calls(&self, calls: usize, failures: usize) {
        self.provider_calls.fetch_add(calls, Ordering::Relaxed);
        self.provider_failures.fetch_add(failures, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn override_hits(&self) -> usize {
        self.override_hits.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> usize {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn provider_calls(&self) -> usize {
        self.provider_calls.load(Ordering::Relaxed)
    }

    pub fn provider_failures(&self) -> usize {
        self.provider_failures.load(Ordering::Relaxed)
    }

    pub fn exhausted(&self) -> usize {
        self.exhausted.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> MetricsReport {
        let hits = self.cache_hits();
        let misses = self.cache_misses();
        let total_cache_queries = hits + misses;
        let cache_hit_rate = if total_cache_queries > 0 {
            (hits as f64 / total_cache_queries as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            override_hits: self.override_hits(),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate,
            provider_calls: self.provider_calls(),
            provider_failures: self.provider_failures(),
            exhausted: self.exhausted(),
        }
    }
}

/// Snapshot of [`ResolveMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub override_hits: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Percentage (0-100)
    pub cache_hit_rate: f64,
    pub provider_calls: usize,
    pub provider_failures: usize,
    pub exhausted: usize,
}

impl MetricsReport {
    /// Format the report for logging.
    pub fn format_log(&self) -> String {
        format!(
            "Resolve metrics: overrides={}, cache hits={}, misses={} ({:.1}% hit rate), \
             provider calls={}, failures={}, exhausted={}",
            self.override_hits,
            self.cache_hits,
            self.cache_misses,
            self.cache_hit_rate,
            self.provider_calls,
            self.provider_failures,
            self.exhausted
        )
    }
}
