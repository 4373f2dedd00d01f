//! Multi-factor provider scoring.
//!
//! Five components, each normalized to [0,1], combined by configured
//! weights. Components with no measurement behind them score a neutral
//! 0.5 rather than guessing in either direction.

use crate::config::ScoringWeights;
use crate::models::ProviderScore;
use crate::provider::{HealthStatus, ProviderHealth};

/// Neutral score used when a component has no observation to draw on.
const NEUTRAL_SCORE: f64 = 0.5;

/// Inputs to scoring one provider for one request.
pub(crate) struct ScoringInputs<'a> {
    pub provider: &'a str,
    /// Effective status after overlaying engine-observed failures
    pub status: HealthStatus,
    /// Latest health snapshot from the provider
    pub health: ProviderHealth,
    /// Smoothed rolling success rate from the stats store
    pub reliability: f64,
    /// Engine-observed p95 latency, preferred over the provider's own
    pub observed_p95_ms: Option<f64>,
    /// Configured rate-limit headroom
    pub cost: f64,
    /// Staleness budget for the requested data type, in seconds
    pub max_staleness_secs: f64,
    /// Latency budget in milliseconds
    pub latency_budget_ms: f64,
}

pub(crate) fn score_provider(inputs: &ScoringInputs<'_>, weights: &ScoringWeights) -> ProviderScore {
    let availability = match inputs.status {
        HealthStatus::Healthy => 1.0,
        HealthStatus::Degraded => 0.5,
        HealthStatus::Down => 0.0,
    };

    let freshness = match inputs.health.data_age_seconds {
        Some(age) if inputs.max_staleness_secs > 0.0 => {
            (1.0 - age / inputs.max_staleness_secs).clamp(0.0, 1.0)
        }
        _ => NEUTRAL_SCORE,
    };

    let p95 = inputs.observed_p95_ms.or(inputs.health.p95_latency_ms);
    let latency = match p95 {
        Some(p95_ms) if inputs.latency_budget_ms > 0.0 => {
            (1.0 - p95_ms / inputs.latency_budget_ms).clamp(0.0, 1.0)
        }
        _ => NEUTRAL_SCORE,
    };

    let reliability = inputs.reliability.clamp(0.0, 1.0);
    let cost = inputs.cost.clamp(0.0, 1.0);

    let composite = weights.availability * availability
        + weights.freshness * freshness
        + weights.reliability * reliability
        + weights.latency * latency
        + weights.cost * cost;

    ProviderScore {
        provider: inputs.provider.to_string(),
        availability,
        freshness,
        reliability,
        latency,
        cost,
        composite,
    }
}

/// Order scores best-first: composite descending, then configured
/// priority order, then provider id for full determinism.
pub(crate) fn order_scores(scores: &mut [ProviderScore], priority: &[String]) {
    scores.sort_by(|a, b| {
        b.composite
            .partial_cmp(&a.composite)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| priority_rank(priority, &a.provider).cmp(&priority_rank(priority, &b.provider)))
            .then_with(|| a.provider.cmp(&b.provider))
    });
}

fn priority_rank(priority: &[String], provider: &str) -> usize {
    priority
        .iter()
        .position(|p| p == provider)
        .unwrap_or(usize::MAX)
}
