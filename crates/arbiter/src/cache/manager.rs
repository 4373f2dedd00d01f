//! Two-tier cache manager.
//!
//! L1 is the volatile in-process tier; L2 is the durable tier behind the
//! [`DurableTier`] trait. Reads go L1 -> L2 with write-behind backfill;
//! writes land in L1 synchronously and in L2 fire-and-forget. Tier
//! failures never propagate: a read failure is a miss, a write failure a
//! logged no-op - the upstream provider remains the source of truth.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};

use crate::config::CacheSettings;
use crate::models::CacheEntry;

use super::memory::MemoryTier;
use super::metrics::{CacheStats, TierMetrics};
use super::tier::DurableTier;

pub struct CacheManager {
    l1: MemoryTier,
    l2: Arc<dyn DurableTier>,
    l1_metrics: TierMetrics,
    l2_metrics: TierMetrics,
    overall_metrics: TierMetrics,
}

impl CacheManager {
    pub fn new(settings: &CacheSettings, l2: Arc<dyn DurableTier>) -> Self {
        Self {
            l1: MemoryTier::new(settings),
            l2,
            l1_metrics: TierMetrics::new(),
            l2_metrics: TierMetrics::new(),
            overall_metrics: TierMetrics::new(),
        }
    }

    /// Fetch a valid entry, trying L1 then L2.
    ///
    /// An L2 hit is backfilled into L1 so the next read stays fast.
    /// Expired entries are misses on either tier.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let started = Instant::now();

        let l1_started = Instant::now();
        if let Some(entry) = self.l1.get(key) {
            self.l1_metrics.record_hit(elapsed_ms(l1_started));
            self.overall_metrics.record_hit(elapsed_ms(started));
            return Some(entry);
        }
        self.l1_metrics.record_miss(elapsed_ms(l1_started));

        let l2_started = Instant::now();
        match self.l2.get(key).await {
            Ok(Some(entry)) if !entry.is_expired() => {
                self.l2_metrics.record_hit(elapsed_ms(l2_started));
                self.overall_metrics.record_hit(elapsed_ms(started));
                self.l1.insert(entry.clone());
                Some(entry)
            }
            Ok(_) => {
                self.l2_metrics.record_miss(elapsed_ms(l2_started));
                self.overall_metrics.record_miss(elapsed_ms(started));
                None
            }
            Err(e) => {
                warn!("L2 read failed for '{}', treating as miss: {}", key, e);
                self.l2_metrics.record_miss(elapsed_ms(l2_started));
                self.overall_metrics.record_miss(elapsed_ms(started));
                None
            }
        }
    }

    /// Write an entry to both tiers.
    ///
    /// L1 is synchronous; the L2 write is spawned and forgotten. Returns
    /// whether L1 accepted the entry.
    pub fn set(&self, entry: CacheEntry) -> bool {
        self.l1.insert(entry.clone());

        let l2 = Arc::clone(&self.l2);
        tokio::spawn(async move {
            if let Err(e) = l2.set(&entry).await {
                warn!("L2 write-behind failed for '{}': {}", entry.key, e);
            }
        });
        true
    }

    /// Fetch many keys with one L2 round trip for the L1 misses.
    pub async fn get_batch(&self, keys: &[String]) -> Vec<Option<CacheEntry>> {
        let started = Instant::now();
        let mut results: Vec<Option<CacheEntry>> = Vec::with_capacity(keys.len());
        let mut missing: Vec<(usize, String)> = Vec::new();

        let l1_started = Instant::now();
        for (index, key) in keys.iter().enumerate() {
            match self.l1.get(key) {
                Some(entry) => results.push(Some(entry)),
                None => {
                    results.push(None);
                    missing.push((index, key.clone()));
                }
            }
        }
        let l1_hits = (keys.len() - missing.len()) as u64;
        self.l1_metrics
            .record_batch(l1_hits, missing.len() as u64, elapsed_ms(l1_started));

        if !missing.is_empty() {
            let lookups: Vec<String> = missing.iter().map(|(_, k)| k.clone()).collect();
            let l2_started = Instant::now();
            match self.l2.get_batch(&lookups).await {
                Ok(fetched) => {
                    let mut l2_hits = 0u64;
                    for ((index, _), found) in missing.iter().zip(fetched) {
                        if let Some(entry) = found.filter(|e| !e.is_expired()) {
                            self.l1.insert(entry.clone());
                            results[*index] = Some(entry);
                            l2_hits += 1;
                        }
                    }
                    self.l2_metrics.record_batch(
                        l2_hits,
                        lookups.len() as u64 - l2_hits,
                        elapsed_ms(l2_started),
                    );
                }
                Err(e) => {
                    warn!("L2 batch read failed, treating {} keys as misses: {}", lookups.len(), e);
                    self.l2_metrics
                        .record_batch(0, lookups.len() as u64, elapsed_ms(l2_started));
                }
            }
        }

        let hits = results.iter().filter(|r| r.is_some()).count() as u64;
        self.overall_metrics
            .record_batch(hits, keys.len() as u64 - hits, elapsed_ms(started));
        results
    }

    /// Write many entries; L1 synchronously, L2 as one spawned batch.
    /// Returns the number accepted by L1.
    pub fn set_batch(&self, entries: Vec<CacheEntry>) -> usize {
        let count = entries.len();
        for entry in &entries {
            self.l1.insert(entry.clone());
        }

        if !entries.is_empty() {
            let l2 = Arc::clone(&self.l2);
            tokio::spawn(async move {
                if let Err(e) = l2.set_batch(&entries).await {
                    warn!("L2 batch write-behind failed ({} entries): {}", entries.len(), e);
                }
            });
        }
        count
    }

    /// Drop a key from both tiers.
    pub async fn invalidate(&self, key: &str) {
        self.l1.remove(key);
        if let Err(e) = self.l2.remove(key).await {
            warn!("L2 invalidation failed for '{}': {}", key, e);
        }
    }

    /// Drop everything from both tiers.
    pub async fn clear(&self) {
        self.l1.clear();
        if let Err(e) = self.l2.clear().await {
            warn!("L2 clear failed: {}", e);
        }
    }

    /// Remove expired rows from the durable tier.
    pub async fn purge_expired(&self) -> usize {
        match self.l2.purge_expired().await {
            Ok(purged) => {
                debug!("Purged {} expired L2 entries", purged);
                purged
            }
            Err(e) => {
                warn!("L2 expiry purge failed: {}", e);
                0
            }
        }
    }

    /// Per-tier and overall hit/miss/latency statistics.
    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            l1: self.l1_metrics.snapshot(),
            l2: self.l2_metrics.snapshot(),
            overall: self.overall_metrics.snapshot(),
        }
    }

    /// Number of entries resident in L1.
    pub fn l1_len(&self) -> usize {
        self.l1.len()
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}
