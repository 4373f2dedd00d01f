//! Validated configuration for the arbitration core.
//!
//! Every knob the collaborating config loader can set is an explicit struct
//! with named fields. Validation runs once at engine construction; an
//! invalid configuration is a construction error, never a per-request one.

use serde::{Deserialize, Serialize};

use crate::cache::EvictionPolicy;
use crate::errors::ArbiterError;
use crate::models::DataType;

/// Tolerance when checking that scoring weights sum to 1.0.
const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Weights for the five provider-scoring components. Must sum to 1.0.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub availability: f64,
    pub freshness: f64,
    pub reliability: f64,
    pub latency: f64,
    pub cost: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            availability: 0.30,
            freshness: 0.25,
            reliability: 0.25,
            latency: 0.15,
            cost: 0.05,
        }
    }
}

impl ScoringWeights {
    fn components(&self) -> [(f64, &'static str); 5] {
        [
            (self.availability, "availability"),
            (self.freshness, "freshness"),
            (self.reliability, "reliability"),
            (self.latency, "latency"),
            (self.cost, "cost"),
        ]
    }

    /// Validate that each weight is in [0,1] and the sum is 1.0 within epsilon.
    pub fn validate(&self) -> Result<(), ArbiterError> {
        for (value, name) in self.components() {
            if !(0.0..=1.0).contains(&value) {
                return Err(ArbiterError::invalid_config(format!(
                    "scoring weight '{}' must be in [0,1], got {}",
                    name, value
                )));
            }
        }
        let sum: f64 = self.components().iter().map(|(v, _)| v).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ArbiterError::invalid_config(format!(
                "scoring weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// Base TTLs per data type, in seconds. All values must be positive.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TtlSettings {
    pub price_secs: u64,
    pub ohlcv_secs: u64,
    pub technical_secs: u64,
    pub sentiment_secs: u64,
    pub news_secs: u64,
    pub correlation_secs: u64,
    pub fundamentals_secs: u64,
    pub risk_secs: u64,
    pub macro_secs: u64,
}

impl Default for TtlSettings {
    fn default() -> Self {
        Self {
            price_secs: 10,
            ohlcv_secs: 60,
            technical_secs: 300,
            sentiment_secs: 300,
            news_secs: 600,
            correlation_secs: 1800,
            fundamentals_secs: 3600,
            risk_secs: 3600,
            macro_secs: 86400,
        }
    }
}

impl TtlSettings {
    /// Base TTL for a data type, before volatility/session adjustment.
    pub fn base_for(&self, data_type: DataType) -> u64 {
        match data_type {
            DataType::Price => self.price_secs,
            DataType::Ohlcv => self.ohlcv_secs,
            DataType::Technical => self.technical_secs,
            DataType::Sentiment => self.sentiment_secs,
            DataType::News => self.news_secs,
            DataType::Correlation => self.correlation_secs,
            DataType::Fundamentals => self.fundamentals_secs,
            DataType::Risk => self.risk_secs,
            DataType::Macro => self.macro_secs,
        }
    }

    fn validate(&self) -> Result<(), ArbiterError> {
        let all = [
            self.price_secs,
            self.ohlcv_secs,
            self.technical_secs,
            self.sentiment_secs,
            self.news_secs,
            self.correlation_secs,
            self.fundamentals_secs,
            self.risk_secs,
            self.macro_secs,
        ];
        if all.iter().any(|&ttl| ttl == 0) {
            return Err(ArbiterError::invalid_config(
                "every data-type TTL must be positive",
            ));
        }
        Ok(())
    }
}

/// Staleness budgets per data type, in seconds.
///
/// Data older than the budget scores zero freshness; data of unknown age
/// scores a neutral 0.5.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StalenessSettings {
    pub price_secs: f64,
    pub ohlcv_secs: f64,
    pub technical_secs: f64,
    pub sentiment_secs: f64,
    pub news_secs: f64,
    pub correlation_secs: f64,
    pub fundamentals_secs: f64,
    pub risk_secs: f64,
    pub macro_secs: f64,
}

impl Default for StalenessSettings {
    fn default() -> Self {
        Self {
            price_secs: 10.0,
            ohlcv_secs: 60.0,
            technical_secs: 300.0,
            sentiment_secs: 600.0,
            news_secs: 900.0,
            correlation_secs: 3600.0,
            fundamentals_secs: 21600.0,
            risk_secs: 21600.0,
            macro_secs: 86400.0,
        }
    }
}

impl StalenessSettings {
    /// Staleness budget for a data type.
    pub fn budget_for(&self, data_type: DataType) -> f64 {
        match data_type {
            DataType::Price => self.price_secs,
            DataType::Ohlcv => self.ohlcv_secs,
            DataType::Technical => self.technical_secs,
            DataType::Sentiment => self.sentiment_secs,
            DataType::News => self.news_secs,
            DataType::Correlation => self.correlation_secs,
            DataType::Fundamentals => self.fundamentals_secs,
            DataType::Risk => self.risk_secs,
            DataType::Macro => self.macro_secs,
        }
    }
}

/// L1 tier sizing and eviction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum number of entries resident in L1
    pub l1_max_entries: usize,
    /// Fraction of capacity at which eviction starts
    pub memory_pressure_threshold: f64,
    /// Eviction policy for L1
    pub eviction_policy: EvictionPolicy,
    /// Entries removed per eviction pass
    pub eviction_batch: usize,
    /// Upper bound on keys with tracked access history
    pub max_tracked_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            l1_max_entries: 10_000,
            memory_pressure_threshold: 0.9,
            eviction_policy: EvictionPolicy::Lru,
            eviction_batch: 100,
            max_tracked_entries: 10_000,
        }
    }
}

impl CacheSettings {
    fn validate(&self) -> Result<(), ArbiterError> {
        if self.l1_max_entries == 0 {
            return Err(ArbiterError::invalid_config("l1_max_entries must be > 0"));
        }
        if !(0.0 < self.memory_pressure_threshold && self.memory_pressure_threshold <= 1.0) {
            return Err(ArbiterError::invalid_config(format!(
                "memory_pressure_threshold must be in (0,1], got {}",
                self.memory_pressure_threshold
            )));
        }
        if self.eviction_batch == 0 {
            return Err(ArbiterError::invalid_config("eviction_batch must be > 0"));
        }
        if self.max_tracked_entries == 0 {
            return Err(ArbiterError::invalid_config(
                "max_tracked_entries must be > 0",
            ));
        }
        Ok(())
    }
}

/// Per-provider call timeout derivation.
///
/// When a provider has observed latency history, its timeout is
/// `p95 * margin_factor` clamped to [min, max]; otherwise `default_ms`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TimeoutSettings {
    pub default_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub margin_factor: f64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default_ms: 5_000,
            min_ms: 500,
            max_ms: 15_000,
            margin_factor: 2.0,
        }
    }
}

impl TimeoutSettings {
    fn validate(&self) -> Result<(), ArbiterError> {
        if self.min_ms == 0 || self.max_ms < self.min_ms {
            return Err(ArbiterError::invalid_config(
                "timeout bounds must satisfy 0 < min_ms <= max_ms",
            ));
        }
        if self.margin_factor < 1.0 {
            return Err(ArbiterError::invalid_config(
                "timeout margin_factor must be >= 1.0",
            ));
        }
        Ok(())
    }
}

/// Cache warming configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WarmerSettings {
    /// Whether scheduled warming runs at all
    pub enabled: bool,
    /// Seconds between scheduled warming runs
    pub interval_seconds: u64,
    /// Symbols to keep warm; empty means use the built-in default list
    pub symbols: Vec<String>,
}

impl Default for WarmerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
            symbols: Vec::new(),
        }
    }
}

impl WarmerSettings {
    fn validate(&self) -> Result<(), ArbiterError> {
        if self.enabled && self.interval_seconds == 0 {
            return Err(ArbiterError::invalid_config(
                "warmer interval_seconds must be > 0 when enabled",
            ));
        }
        Ok(())
    }
}

/// Top-level configuration for the arbitration core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArbiterConfig {
    pub weights: ScoringWeights,
    pub ttl: TtlSettings,
    pub staleness: StalenessSettings,
    pub cache: CacheSettings,
    pub timeouts: TimeoutSettings,
    pub warmer: WarmerSettings,
    /// Fallback providers tried after the primary (plan size = 1 + this)
    pub fallback_count: usize,
    /// Operator-configured tie-break order; earlier ids win ties
    pub provider_priority: Vec<String>,
    /// Latency budget for the latency score component, in milliseconds
    pub latency_budget_ms: f64,
    /// How long a provider health snapshot stays usable for scoring
    pub health_snapshot_ttl_ms: u64,
    /// Rolling window length for reliability tracking
    pub reliability_window: usize,
    /// Bayesian prior success rate for providers with little history
    pub reliability_prior: f64,
    /// Weight of the prior, in pseudo-observations
    pub reliability_prior_weight: f64,
    /// Consecutive failures before a provider is marked degraded
    pub degraded_failure_threshold: u32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            ttl: TtlSettings::default(),
            staleness: StalenessSettings::default(),
            cache: CacheSettings::default(),
            timeouts: TimeoutSettings::default(),
            warmer: WarmerSettings::default(),
            fallback_count: 2,
            provider_priority: Vec::new(),
            latency_budget_ms: 2_000.0,
            health_snapshot_ttl_ms: 5_000,
            reliability_window: 50,
            reliability_prior: 0.9,
            reliability_prior_weight: 10.0,
            degraded_failure_threshold: 3,
        }
    }
}

impl ArbiterConfig {
    /// Validate the whole configuration tree.
    ///
    /// Called once at engine construction; failing here refuses to serve
    /// traffic rather than producing per-request errors later.
    pub fn validate(&self) -> Result<(), ArbiterError> {
        self.weights.validate()?;
        self.ttl.validate()?;
        self.cache.validate()?;
        self.timeouts.validate()?;
        self.warmer.validate()?;
        if self.latency_budget_ms <= 0.0 {
            return Err(ArbiterError::invalid_config(
                "latency_budget_ms must be > 0",
            ));
        }
        if self.reliability_window == 0 {
            return Err(ArbiterError::invalid_config(
                "reliability_window must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.reliability_prior) {
            return Err(ArbiterError::invalid_config(
                "reliability_prior must be in [0,1]",
            ));
        }
        if self.degraded_failure_threshold == 0 {
            return Err(ArbiterError::invalid_config(
                "degraded_failure_threshold must be > 0",
            ));
        }
        Ok(())
    }
}
