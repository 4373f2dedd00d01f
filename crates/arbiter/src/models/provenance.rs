use serde::{Deserialize, Serialize};

/// Where a resolved value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Served from the tiered cache without touching a provider
    Cache,
    /// Fetched from an upstream provider on this call
    Provider,
}

/// Metadata attached to every resolved value.
///
/// A value is never returned without naming its source; callers can always
/// tell a cache read from a live fetch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Provenance {
    /// Cache or live provider fetch
    pub source: DataSource,
    /// Provider that originally produced the value
    pub provider: String,
    /// Composite score the provider won with, absent on cache reads
    pub score: Option<f64>,
}

impl Provenance {
    /// Provenance for a cache hit attributed to its original provider.
    pub fn cache(provider: impl Into<String>) -> Self {
        Self {
            source: DataSource::Cache,
            provider: provider.into(),
            score: None,
        }
    }

    /// Provenance for a live fetch from the named provider.
    pub fn provider(provider: impl Into<String>, score: f64) -> Self {
        Self {
            source: DataSource::Provider,
            provider: provider.into(),
            score: Some(score),
        }
    }
}

/// A resolved value together with its provenance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Resolved {
    /// The market data payload
    pub value: serde_json::Value,
    /// Where it came from
    pub provenance: Provenance,
}
