//! Rolling per-provider reliability and latency statistics.
//!
//! Owned by the engine and passed by handle to scoring - provider
//! performance state is explicit, never process-wide.

use std::collections::VecDeque;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::cache::percentile;
use crate::provider::HealthStatus;

#[derive(Debug, Default)]
struct ProviderStats {
    /// Success/failure outcomes for the last `window` calls.
    outcomes: VecDeque<bool>,
    /// Latencies of the last `window` successful calls, in milliseconds.
    latencies_ms: VecDeque<f64>,
    consecutive_failures: u32,
}

/// Point-in-time view of one provider's tracked performance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderStatsSnapshot {
    pub provider: String,
    /// Smoothed rolling success rate
    pub reliability: f64,
    pub p95_latency_ms: Option<f64>,
    pub consecutive_failures: u32,
    pub degraded: bool,
    /// Calls currently inside the rolling window
    pub tracked_calls: usize,
}

/// Concurrency-safe store of rolling provider performance.
///
/// Reliability is Bayesian-smoothed toward a configurable prior so new
/// providers score sensibly instead of swinging on their first calls.
/// A run of consecutive failures marks the provider degraded; the next
/// success clears it.
pub struct ProviderStatsStore {
    stats: DashMap<String, ProviderStats>,
    window: usize,
    prior: f64,
    prior_weight: f64,
    degraded_threshold: u32,
}

impl ProviderStatsStore {
    pub fn new(window: usize, prior: f64, prior_weight: f64, degraded_threshold: u32) -> Self {
        Self {
            stats: DashMap::new(),
            window,
            prior,
            prior_weight,
            degraded_threshold,
        }
    }

    /// Record a successful call and its latency.
    pub fn record_success(&self, provider: &str, latency_ms: f64) {
        let mut entry = self.stats.entry(provider.to_string()).or_default();
        push_bounded(&mut entry.outcomes, true, self.window);
        push_bounded(&mut entry.latencies_ms, latency_ms, self.window);
        entry.consecutive_failures = 0;
    }

    /// Record a failed call.
    pub fn record_failure(&self, provider: &str) {
        let mut entry = self.stats.entry(provider.to_string()).or_default();
        push_bounded(&mut entry.outcomes, false, self.window);
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
    }

    /// Smoothed rolling success rate in [0,1].
    pub fn reliability(&self, provider: &str) -> f64 {
        match self.stats.get(provider) {
            Some(entry) => {
                let successes = entry.outcomes.iter().filter(|&&ok| ok).count() as f64;
                let calls = entry.outcomes.len() as f64;
                (self.prior * self.prior_weight + successes) / (self.prior_weight + calls)
            }
            None => self.prior,
        }
    }

    /// Engine-observed p95 latency, when enough history exists.
    pub fn p95_latency_ms(&self, provider: &str) -> Option<f64> {
        let entry = self.stats.get(provider)?;
        if entry.latencies_ms.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = entry.latencies_ms.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Some(percentile(&sorted, 0.95))
    }

    /// Whether the provider has failed enough times in a row to be
    /// considered degraded.
    pub fn is_degraded(&self, provider: &str) -> bool {
        self.stats
            .get(provider)
            .map(|e| e.consecutive_failures >= self.degraded_threshold)
            .unwrap_or(false)
    }

    /// Provider-reported status overlaid with engine-observed failures.
    ///
    /// Down always stays Down; otherwise a degraded marking takes
    /// precedence over whatever the provider reports about itself.
    pub fn effective_status(&self, provider: &str, reported: HealthStatus) -> HealthStatus {
        match reported {
            HealthStatus::Down => HealthStatus::Down,
            _ if self.is_degraded(provider) => HealthStatus::Degraded,
            other => other,
        }
    }

    /// Snapshot every tracked provider.
    pub fn report(&self) -> Vec<ProviderStatsSnapshot> {
        // Collect keys first; shard guards must not be held while taking
        // further locks on the same map.
        let providers: Vec<String> = self.stats.iter().map(|e| e.key().clone()).collect();

        let mut snapshots: Vec<ProviderStatsSnapshot> = providers
            .into_iter()
            .map(|provider| {
                let (consecutive_failures, tracked_calls) = self
                    .stats
                    .get(&provider)
                    .map(|e| (e.consecutive_failures, e.outcomes.len()))
                    .unwrap_or((0, 0));
                ProviderStatsSnapshot {
                    reliability: self.reliability(&provider),
                    p95_latency_ms: self.p95_latency_ms(&provider),
                    consecutive_failures,
                    degraded: consecutive_failures >= self.degraded_threshold,
                    tracked_calls,
                    provider,
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.provider.cmp(&b.provider));
        snapshots
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, value: T, window: usize) {
    if buffer.len() >= window {
        buffer.pop_front();
    }
    buffer.push_back(value);
}
