//! Provider capability interface.
//!
//! Every upstream data source is reached through this trait; the registry
//! and engine never see provider internals, only the capability surface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ArbiterError;
use crate::models::{Asset, DataRequest};

/// Reported health of a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Operating normally
    Healthy,
    /// Serving requests with elevated errors or latency
    Degraded,
    /// Not serving requests
    Down,
}

/// Point-in-time health snapshot for a provider.
///
/// Optional fields are absent when the provider has no measurement to
/// report; scoring substitutes neutral values.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    /// Provider-observed p95 request latency
    pub p95_latency_ms: Option<f64>,
    /// Provider-observed success rate in [0,1]
    pub success_rate: Option<f64>,
    /// Age of the provider's freshest data for this feed, in seconds
    pub data_age_seconds: Option<f64>,
}

impl ProviderHealth {
    /// A healthy snapshot with no measurements.
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            p95_latency_ms: None,
            success_rate: None,
            data_age_seconds: None,
        }
    }

    /// A snapshot with the given status and no measurements.
    pub fn with_status(status: HealthStatus) -> Self {
        Self {
            status,
            ..Self::healthy()
        }
    }
}

/// A successful provider response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The market data payload
    pub value: serde_json::Value,
    /// Provider confidence in the value, in [0,1]
    pub confidence: f64,
    /// Intraday volatility of the instrument in percent, when the
    /// provider reports it; feeds the TTL policy for price/ohlcv data
    pub volatility_pct: Option<f64>,
}

impl ProviderResponse {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            confidence: 1.0,
            volatility_pct: None,
        }
    }

    pub fn with_volatility(mut self, volatility_pct: f64) -> Self {
        self.volatility_pct = Some(volatility_pct);
        self
    }
}

/// Trait for upstream market data providers.
///
/// Implement this trait to plug a new data source into the registry.
/// Fetches are idempotent reads; the engine may call any number of
/// providers for the same request without coordination.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// Should be a constant string like "ALPACA", "POLYGON", etc.
    /// Used for logging, cache attribution, and stats tracking.
    fn id(&self) -> &'static str;

    /// Whether this provider can serve the given asset.
    fn supports_asset(&self, asset: &Asset) -> bool;

    /// Current health snapshot.
    ///
    /// Called at scoring time; implementations should answer from local
    /// state, not by probing the upstream service.
    fn health(&self) -> ProviderHealth;

    /// Rate-limit headroom score in [0,1].
    ///
    /// 1.0 means abundant quota, 0.0 near-exhausted. Static configuration,
    /// not measured at request time.
    fn cost_score(&self) -> f64 {
        1.0
    }

    /// Fetch the requested data.
    async fn fetch(&self, request: &DataRequest) -> Result<ProviderResponse, ArbiterError>;
}
