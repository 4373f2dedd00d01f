use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Classification of tradable instruments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Crypto,
    Forex,
    Commodity,
    Index,
    Etf,
    Option,
    Future,
}

impl AssetClass {
    /// Stable lowercase identifier, used in logs and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equity => "equity",
            Self::Crypto => "crypto",
            Self::Forex => "forex",
            Self::Commodity => "commodity",
            Self::Index => "index",
            Self::Etf => "etf",
            Self::Option => "option",
            Self::Future => "future",
        }
    }
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tradable instrument.
///
/// Immutable value object. Equality and hashing cover
/// (symbol, class, market, exchange); currency is descriptive only and
/// excluded from identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Asset {
    /// Ticker symbol, normalized to uppercase
    pub symbol: String,
    /// Instrument classification
    pub class: AssetClass,
    /// Market or region identifier (e.g., "US", "EU")
    pub market: String,
    /// Listing exchange, when known
    pub exchange: Option<String>,
    /// Quote currency (ISO 4217)
    pub currency: String,
}

impl Asset {
    /// Create an asset, normalizing the symbol to uppercase.
    pub fn new(
        symbol: impl Into<String>,
        class: AssetClass,
        market: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            class,
            market: market.into(),
            exchange: None,
            currency: currency.into(),
        }
    }

    /// Attach a listing exchange.
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Convenience constructor for a US-listed instrument quoted in USD.
    pub fn us(symbol: impl Into<String>, class: AssetClass) -> Self {
        Self::new(symbol, class, "US", "USD")
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && self.class == other.class
            && self.market == other.market
            && self.exchange == other.exchange
    }
}

impl Eq for Asset {}

impl Hash for Asset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.symbol.hash(state);
        self.class.hash(state);
        self.market.hash(state);
        self.exchange.hash(state);
    }
}
