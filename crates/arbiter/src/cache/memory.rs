//! The volatile L1 tier: a bounded in-process map wired to the eviction
//! tracker. All operations are fast enough to treat as non-blocking.

use dashmap::DashMap;
use log::debug;

use crate::config::CacheSettings;
use crate::models::CacheEntry;

use super::eviction::EvictionTracker;

pub struct MemoryTier {
    entries: DashMap<String, CacheEntry>,
    tracker: EvictionTracker,
    max_entries: usize,
    eviction_batch: usize,
}

impl MemoryTier {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            entries: DashMap::new(),
            tracker: EvictionTracker::new(
                settings.eviction_policy,
                settings.max_tracked_entries,
                settings.memory_pressure_threshold,
            ),
            max_entries: settings.l1_max_entries,
            eviction_batch: settings.eviction_batch,
        }
    }

    /// Fetch a valid entry, expiring lazily.
    ///
    /// An entry past its TTL is removed and reported as a miss even though
    /// it was still resident.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            self.tracker.remove(key);
            return None;
        }
        let cloned = entry.clone();
        drop(entry);
        self.tracker.track_access(key);
        Some(cloned)
    }

    /// Insert an entry, evicting under capacity pressure.
    pub fn insert(&self, entry: CacheEntry) {
        let key = entry.key.clone();
        let expires_at = entry.expires_at().timestamp().max(0) as u64;
        self.entries.insert(key.clone(), entry);
        self.tracker.track_insert(&key, expires_at);
        self.evict_under_pressure();
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
        self.tracker.remove(key);
    }

    pub fn clear(&self) {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_under_pressure(&self) {
        while self.tracker.should_evict(self.entries.len(), self.max_entries) {
            let candidates = self.tracker.eviction_candidates(self.eviction_batch);
            let mut removed = 0usize;
            for key in &candidates {
                if self.entries.remove(key).is_some() {
                    removed += 1;
                }
                self.tracker.remove(key);
            }

            if removed == 0 {
                // No tracked candidates left; shed arbitrary entries so the
                // tier cannot grow without bound.
                let stray: Vec<String> = self
                    .entries
                    .iter()
                    .take(self.eviction_batch)
                    .map(|e| e.key().clone())
                    .collect();
                for key in &stray {
                    self.entries.remove(key);
                    self.tracker.remove(key);
                    removed += 1;
                }
            }

            debug!("L1 eviction pass removed {} entries", removed);
            if removed == 0 {
                break;
            }
        }
    }
}
