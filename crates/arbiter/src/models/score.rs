use serde::{Deserialize, Serialize};

/// Result of scoring one provider against one request.
///
/// All component scores are normalized to [0,1]; the composite is the
/// configured weighted sum.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderScore {
    /// Provider identifier
    pub provider: String,
    /// 1.0 healthy, 0.5 degraded, 0.0 down
    pub availability: f64,
    /// How recent the provider's data is relative to the staleness budget
    pub freshness: f64,
    /// Smoothed rolling success rate
    pub reliability: f64,
    /// Observed p95 latency relative to the latency budget
    pub latency: f64,
    /// Configured rate-limit headroom
    pub cost: f64,
    /// Weighted composite of the five components
    pub composite: f64,
}

/// Ordered list of providers to try for one request.
///
/// Position 0 is the primary; the rest are fallbacks. Plans are computed
/// per request and discarded after use - provider health moves too fast
/// for a cached plan to stay valid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Scored providers, best first
    pub entries: Vec<ProviderScore>,
}

impl ExecutionPlan {
    /// The highest-scored provider.
    pub fn primary(&self) -> Option<&ProviderScore> {
        self.entries.first()
    }

    /// Provider identifiers in execution order.
    pub fn provider_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.provider.as_str()).collect()
    }

    /// Number of entries in the plan.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
