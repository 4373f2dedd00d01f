use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A cached value with its freshness contract.
///
/// An entry is valid for reads while `now < written_at + ttl_seconds`.
/// Past that point it is a logical miss even if still physically resident;
/// lazy expiry on read complements active eviction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cache key this entry was stored under
    pub key: String,
    /// The cached payload
    pub value: serde_json::Value,
    /// Confidence attached by the source provider, in [0,1]
    pub confidence: f64,
    /// When the entry was written
    pub written_at: DateTime<Utc>,
    /// Seconds the entry stays valid after `written_at`
    pub ttl_seconds: u64,
    /// Identifier of the provider that produced the value
    pub source_provider: String,
}

impl CacheEntry {
    /// Create an entry written now.
    pub fn new(
        key: impl Into<String>,
        value: serde_json::Value,
        confidence: f64,
        ttl_seconds: u64,
        source_provider: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            confidence,
            written_at: Utc::now(),
            ttl_seconds,
            source_provider: source_provider.into(),
        }
    }

    /// The instant this entry stops being valid.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.written_at + Duration::seconds(self.ttl_seconds as i64)
    }

    /// Whether the entry has passed its TTL.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at()
    }

    /// Seconds of validity remaining, zero if already expired.
    pub fn remaining_secs(&self) -> u64 {
        (self.expires_at() - Utc::now()).num_seconds().max(0) as u64
    }
}
