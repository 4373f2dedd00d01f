use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::asset::Asset;

/// The kind of market data being requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Price,
    Ohlcv,
    Fundamentals,
    Technical,
    Sentiment,
    News,
    Macro,
    Correlation,
    Risk,
}

impl DataType {
    /// Stable lowercase identifier, used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Ohlcv => "ohlcv",
            Self::Fundamentals => "fundamentals",
            Self::Technical => "technical",
            Self::Sentiment => "sentiment",
            Self::News => "news",
            Self::Macro => "macro",
            Self::Correlation => "correlation",
            Self::Risk => "risk",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request for one (asset, data-type) pair.
///
/// Parameters are kept in a `BTreeMap` so the derived cache key is
/// deterministic regardless of insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequest {
    /// The instrument being requested
    pub asset: Asset,
    /// The kind of data being requested
    pub data_type: DataType,
    /// Optional request parameters (timeframe, lookback, ...)
    pub params: BTreeMap<String, String>,
}

impl DataRequest {
    /// Create a request with no parameters.
    pub fn new(asset: Asset, data_type: DataType) -> Self {
        Self {
            asset,
            data_type,
            params: BTreeMap::new(),
        }
    }

    /// Attach a request parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Provider-agnostic cache key: `{symbol}:{data_type}:{params-hash}`.
    ///
    /// Holds the best known value for plain reads, regardless of which
    /// provider produced it.
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.asset.symbol,
            self.data_type.as_str(),
            self.params_hash()
        )
    }

    /// Provider-attributed cache key:
    /// `{provider}:{symbol}:{data_type}:{params-hash}`.
    ///
    /// Written alongside the alias key on every cache-filling fetch so
    /// per-provider history stays addressable.
    pub fn provider_key(&self, provider: &str) -> String {
        format!("{}:{}", provider, self.cache_key())
    }

    /// Deterministic digest of the request parameters.
    fn params_hash(&self) -> String {
        let canonical = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let digest = md5::compute(canonical.as_bytes());
        // First 8 hex chars are plenty for key disambiguation.
        format!("{:x}", digest)[..8].to_string()
    }
}
