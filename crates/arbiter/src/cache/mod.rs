//! Tiered cache subsystem.
//!
//! Two tiers with distinct contracts:
//! - L1: volatile, in-process, bounded, evicted under pressure by the
//!   [`EvictionTracker`]
//! - L2: durable, higher-latency, behind the [`DurableTier`] trait with a
//!   SQLite implementation
//!
//! The [`CacheManager`] fronts both with get/set/batch operations and
//! per-tier latency and hit-rate telemetry.

mod eviction;
mod manager;
mod memory;
mod metrics;
mod sqlite;
mod tier;

pub use eviction::{EvictionPolicy, EvictionTracker};
pub use manager::CacheManager;
pub use memory::MemoryTier;
pub use metrics::{percentile, CacheStats, TierMetrics, TierStats};
pub use sqlite::SqliteTier;
pub use tier::{DurableTier, NullTier};
