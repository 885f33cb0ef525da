use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Tracks kernel cache activity
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    builds: Arc<AtomicU64>,
    build_failures: Arc<AtomicU64>,
    cache_hits: Arc<AtomicU64>,
    cache_misses: Arc<AtomicU64>,
}

impl CacheMetrics {
    /// Creates a new CacheMetrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a lookup that found a ready bundle
    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lookup that had to run the builder
    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful build
    pub fn record_build(&self, device: &str) {
        let total = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Kernel bundle built for {}, total builds: {}", device, total);
    }

    /// Records a failed build
    pub fn record_build_failure(&self, device: &str) {
        let total = self.build_failures.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Kernel build failed for {}, total failures: {}", device, total);
    }

    /// Gets current cache statistics
    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            builds: self.builds.load(Ordering::SeqCst),
            build_failures: self.build_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Logs current statistics
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Kernel cache: {} builds, {} failures, {} hits, {} misses (hit rate {:.1}%)",
            stats.builds,
            stats.build_failures,
            stats.cache_hits,
            stats.cache_misses,
            stats.hit_rate() * 100.0
        );
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub builds: u64,
    pub build_failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served without running the builder
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
