//! Hit/miss counters and latency percentile tracking for cache tiers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::warn;
use serde::{Deserialize, Serialize};

/// Number of recent latency samples kept per tier.
const DEFAULT_SAMPLE_WINDOW: usize = 1024;

/// Point-in-time statistics for one tier.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

/// Combined statistics report across both tiers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1: TierStats,
    pub l2: TierStats,
    pub overall: TierStats,
}

/// Hit/miss counters plus a bounded window of recent access latencies.
///
/// Counters are atomic; the sample window sits behind a mutex that is held
/// only for push/snapshot, never across I/O.
pub struct TierMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    samples: Mutex<VecDeque<f64>>,
    window: usize,
}

impl TierMetrics {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_SAMPLE_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            samples: Mutex::new(VecDeque::with_capacity(window.min(DEFAULT_SAMPLE_WINDOW))),
            window: window.max(1),
        }
    }

    fn lock_samples(&self) -> MutexGuard<'_, VecDeque<f64>> {
        self.samples.lock().unwrap_or_else(|poisoned| {
            warn!("Tier metrics mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Record a hit with the physical access latency.
    pub fn record_hit(&self, latency_ms: f64) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.push_sample(latency_ms);
    }

    /// Record a miss with the physical access latency.
    pub fn record_miss(&self, latency_ms: f64) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.push_sample(latency_ms);
    }

    /// Record hit/miss counts from a batch operation with one shared latency sample.
    pub fn record_batch(&self, hits: u64, misses: u64, latency_ms: f64) {
        self.hits.fetch_add(hits, Ordering::Relaxed);
        self.misses.fetch_add(misses, Ordering::Relaxed);
        self.push_sample(latency_ms);
    }

    fn push_sample(&self, latency_ms: f64) {
        let mut samples = self.lock_samples();
        if samples.len() >= self.window {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
    }

    /// Snapshot the current counters and latency percentiles.
    pub fn snapshot(&self) -> TierStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        let mut sorted: Vec<f64> = self.lock_samples().iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        TierStats {
            hits,
            misses,
            hit_rate,
            p50_latency_ms: percentile(&sorted, 0.50),
            p95_latency_ms: percentile(&sorted, 0.95),
            p99_latency_ms: percentile(&sorted, 0.99),
        }
    }
}

impl Default for TierMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile of an ascending-sorted sample set, nearest-rank method.
///
/// Returns 0.0 for an empty set.
pub fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (quantile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
