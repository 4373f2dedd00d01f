//! Access tracking and eviction candidate selection for the L1 tier.
//!
//! The tracker is sharded: each shard guards its own record map plus two
//! ordered indexes (policy priority and tracking recency) behind a private
//! mutex, so concurrent cache operations contend only within a shard and
//! every update stays O(log n). Candidate selection merges shard heads
//! instead of scanning the full tracked set.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::warn;
use serde::{Deserialize, Serialize};

const SHARD_COUNT: usize = 16;

/// Rule for choosing which entries to remove under capacity pressure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the least-recently-accessed entry
    Lru,
    /// Evict the least-frequently-accessed entry
    Lfu,
    /// Evict the soonest-to-expire entry regardless of access pattern
    Ttl,
    /// Evict the oldest-inserted entry
    Fifo,
}

/// Per-key access history.
#[derive(Debug)]
struct Record {
    last_access: u64,
    access_count: u64,
    inserted_seq: u64,
    expires_at: u64,
    priority_key: (u64, u64),
    recency_key: (u64, u64),
}

/// One shard of the tracked set.
#[derive(Default)]
struct Shard {
    records: HashMap<String, Record>,
    /// Policy order: first entry is the best eviction candidate.
    by_priority: BTreeMap<(u64, u64), String>,
    /// Tracking recency order, used for bounded-tracking drop-out.
    by_recency: BTreeMap<(u64, u64), String>,
}

/// Tracks per-key recency/frequency and recommends evictions.
///
/// Tracking is bounded to `max_tracked_entries`; when a shard is full the
/// least-recently-tracked key is dropped from tracking and queued as a
/// top-priority eviction candidate, since a key with no access history
/// cannot compete with tracked ones.
pub struct EvictionTracker {
    shards: Vec<Mutex<Shard>>,
    /// Keys dropped from tracking, drained first by candidate selection.
    overflow: Mutex<VecDeque<String>>,
    clock: AtomicU64,
    policy: EvictionPolicy,
    per_shard_cap: usize,
    max_tracked: usize,
    pressure_threshold: f64,
}

impl EvictionTracker {
    pub fn new(policy: EvictionPolicy, max_tracked_entries: usize, pressure_threshold: f64) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(Shard::default())).collect();
        Self {
            shards,
            overflow: Mutex::new(VecDeque::new()),
            clock: AtomicU64::new(1),
            policy,
            per_shard_cap: (max_tracked_entries / SHARD_COUNT).max(1),
            max_tracked: max_tracked_entries,
            pressure_threshold,
        }
    }

    /// The configured policy.
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % SHARD_COUNT
    }

    fn lock_shard(&self, index: usize) -> MutexGuard<'_, Shard> {
        self.shards[index].lock().unwrap_or_else(|poisoned| {
            warn!("Eviction tracker shard mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_overflow(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.overflow.lock().unwrap_or_else(|poisoned| {
            warn!("Eviction tracker overflow mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn priority_value(&self, record: &Record) -> u64 {
        match self.policy {
            EvictionPolicy::Lru => record.last_access,
            EvictionPolicy::Lfu => record.access_count,
            EvictionPolicy::Ttl => record.expires_at,
            EvictionPolicy::Fifo => record.inserted_seq,
        }
    }

    /// Start (or refresh) tracking for a key written to the cache.
    ///
    /// `expires_at` is the entry's expiry as epoch seconds, consulted only
    /// by the TTL policy.
    pub fn track_insert(&self, key: &str, expires_at: u64) {
        let tick = self.tick();
        let index = self.shard_index(key);
        let mut shard = self.lock_shard(index);

        if let Some(record) = shard.records.get_mut(key) {
            record.last_access = tick;
            record.access_count += 1;
            record.inserted_seq = tick;
            record.expires_at = expires_at;
            let (old_priority, old_recency) = (record.priority_key, record.recency_key);
            shard.by_priority.remove(&old_priority);
            shard.by_recency.remove(&old_recency);
            self.reindex(&mut shard, key, tick);
            return;
        }

        if shard.records.len() >= self.per_shard_cap {
            self.drop_least_recently_tracked(&mut shard);
        }

        shard.records.insert(
            key.to_string(),
            Record {
                last_access: tick,
                access_count: 1,
                inserted_seq: tick,
                expires_at,
                priority_key: (0, 0),
                recency_key: (0, 0),
            },
        );
        self.reindex(&mut shard, key, tick);
    }

    /// Record a read of a key. Unknown keys are ignored; they re-enter
    /// tracking on their next write.
    pub fn track_access(&self, key: &str) {
        let tick = self.tick();
        let index = self.shard_index(key);
        let mut shard = self.lock_shard(index);

        let Some(record) = shard.records.get_mut(key) else {
            return;
        };
        record.last_access = tick;
        record.access_count += 1;
        let (old_priority, old_recency) = (record.priority_key, record.recency_key);
        shard.by_priority.remove(&old_priority);
        shard.by_recency.remove(&old_recency);
        self.reindex(&mut shard, key, tick);
    }

    /// Rebuild a record's index entries after its counters changed.
    fn reindex(&self, shard: &mut Shard, key: &str, tick: u64) {
        let Some(record) = shard.records.get_mut(key) else {
            return;
        };
        let priority_key = (self.priority_value(record), tick);
        let recency_key = (record.last_access, tick);
        record.priority_key = priority_key;
        record.recency_key = recency_key;
        shard.by_priority.insert(priority_key, key.to_string());
        shard.by_recency.insert(recency_key, key.to_string());
    }

    fn drop_least_recently_tracked(&self, shard: &mut Shard) {
        let Some((&recency_key, _)) = shard.by_recency.iter().next() else {
            return;
        };
        let Some(key) = shard.by_recency.remove(&recency_key) else {
            return;
        };
        if let Some(record) = shard.records.remove(&key) {
            shard.by_priority.remove(&record.priority_key);
        }
        let mut overflow = self.lock_overflow();
        if overflow.len() >= self.max_tracked {
            overflow.pop_front();
        }
        overflow.push_back(key);
    }

    /// Stop tracking a key that left the cache.
    pub fn remove(&self, key: &str) {
        let index = self.shard_index(key);
        let mut shard = self.lock_shard(index);
        if let Some(record) = shard.records.remove(key) {
            shard.by_priority.remove(&record.priority_key);
            shard.by_recency.remove(&record.recency_key);
        }
    }

    /// Whether the key currently has tracked history.
    pub fn is_tracked(&self, key: &str) -> bool {
        let index = self.shard_index(key);
        self.lock_shard(index).records.contains_key(key)
    }

    /// Number of keys with tracked history.
    pub fn tracked_len(&self) -> usize {
        self.shards
            .iter()
            .enumerate()
            .map(|(i, _)| self.lock_shard(i).records.len())
            .sum()
    }

    /// Whether the tier has crossed the memory pressure threshold.
    pub fn should_evict(&self, current_size: usize, max_size: usize) -> bool {
        if max_size == 0 {
            return true;
        }
        current_size as f64 / max_size as f64 >= self.pressure_threshold
    }

    /// Up to `count` keys in eviction-priority order.
    ///
    /// Keys dropped from tracking come first (no history, nothing to argue
    /// for keeping them); the rest merge the per-shard priority heads.
    pub fn eviction_candidates(&self, count: usize) -> Vec<String> {
        let mut candidates = Vec::with_capacity(count);

        {
            let mut overflow = self.lock_overflow();
            while candidates.len() < count {
                match overflow.pop_front() {
                    Some(key) => candidates.push(key),
                    None => break,
                }
            }
        }

        if candidates.len() >= count {
            return candidates;
        }
        let remaining = count - candidates.len();

        // Merge the first `remaining` entries of each shard's priority index.
        let mut merged: Vec<((u64, u64), String)> = Vec::new();
        for index in 0..SHARD_COUNT {
            let shard = self.lock_shard(index);
            merged.extend(
                shard
                    .by_priority
                    .iter()
                    .take(remaining)
                    .map(|(k, v)| (*k, v.clone())),
            );
        }
        merged.sort_by(|a, b| a.0.cmp(&b.0));
        candidates.extend(merged.into_iter().take(remaining).map(|(_, key)| key));
        candidates
    }
}
