//! The durable L2 tier contract.

use async_trait::async_trait;

use crate::errors::ArbiterError;
use crate::models::CacheEntry;

/// A durable cache tier with batch-capable operations.
///
/// Every method is a blocking-I/O boundary; callers must not hold locks
/// across these calls. Durability is best effort - the source of truth
/// is always the upstream provider, so tier failures are recoverable.
#[async_trait]
pub trait DurableTier: Send + Sync {
    /// Fetch one entry by key. Expiry is not checked here; the manager
    /// applies the TTL contract uniformly across tiers.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, ArbiterError>;

    /// Fetch many entries in one round trip, preserving input order.
    async fn get_batch(&self, keys: &[String]) -> Result<Vec<Option<CacheEntry>>, ArbiterError>;

    /// Upsert one entry.
    async fn set(&self, entry: &CacheEntry) -> Result<(), ArbiterError>;

    /// Upsert many entries in one round trip; returns the number written.
    async fn set_batch(&self, entries: &[CacheEntry]) -> Result<usize, ArbiterError>;

    /// Remove one entry.
    async fn remove(&self, key: &str) -> Result<(), ArbiterError>;

    /// Remove everything.
    async fn clear(&self) -> Result<(), ArbiterError>;

    /// Drop entries past their TTL; returns the number removed.
    async fn purge_expired(&self) -> Result<usize, ArbiterError>;
}

/// A durable tier that stores nothing.
///
/// Stands in for L2 when the deployment runs without a durable store;
/// every read is a miss and every write succeeds without effect.
pub struct NullTier;

#[async_trait]
impl DurableTier for NullTier {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, ArbiterError> {
        Ok(None)
    }

    async fn get_batch(&self, keys: &[String]) -> Result<Vec<Option<CacheEntry>>, ArbiterError> {
        Ok(vec![None; keys.len()])
    }

    async fn set(&self, _entry: &CacheEntry) -> Result<(), ArbiterError> {
        Ok(())
    }

    async fn set_batch(&self, entries: &[CacheEntry]) -> Result<usize, ArbiterError> {
        Ok(entries.len())
    }

    async fn remove(&self, _key: &str) -> Result<(), ArbiterError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), ArbiterError> {
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, ArbiterError> {
        Ok(0)
    }
}
