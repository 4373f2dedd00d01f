//! Proactive cache warming for high-traffic assets.
//!
//! Runs once at startup and on a schedule, pushing price data for a
//! configured hot set through the normal resolve path so the entries land
//! in cache with full provenance. Per-asset failures never abort a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::config::WarmerSettings;
use crate::engine::ArbitrationEngine;
use crate::models::{Asset, AssetClass, DataRequest, DataType};

lazy_static! {
    /// Default hot set: major US equities, indices, and cryptocurrencies.
    static ref DEFAULT_WARM_SYMBOLS: Vec<&'static str> = vec![
        "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK-B",
        "JPM", "V", "UNH", "XOM", "JNJ", "WMT", "PG",
        "SPY", "QQQ", "IWM",
        "^GSPC", "^DJI", "^IXIC",
        "BTC-USD", "ETH-USD", "SOL-USD", "XRP-USD",
    ];
}

/// Assets fetched concurrently within one warming run.
const WARM_CONCURRENCY: usize = 4;

enum WarmOutcome {
    Skipped,
    Succeeded,
    Failed,
}

/// Outcome of one warming run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WarmResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Assets skipped because their cache entry was still fresh
    pub skipped: usize,
}

/// Proactively fetches and caches data for a known hot set.
pub struct CacheWarmer {
    engine: Arc<ArbitrationEngine>,
    settings: WarmerSettings,
    /// Guards against overlapping scheduled runs.
    in_flight: AtomicBool,
}

impl CacheWarmer {
    pub fn new(engine: Arc<ArbitrationEngine>, settings: WarmerSettings) -> Self {
        Self {
            engine,
            settings,
            in_flight: AtomicBool::new(false),
        }
    }

    /// The assets this warmer keeps hot.
    pub fn warm_set(&self) -> Vec<Asset> {
        if self.settings.symbols.is_empty() {
            DEFAULT_WARM_SYMBOLS
                .iter()
                .map(|s| classify_symbol(s))
                .collect()
        } else {
            self.settings
                .symbols
                .iter()
                .map(|s| classify_symbol(s))
                .collect()
        }
    }

    /// One-shot warming at process start.
    pub async fn warm_on_startup(&self) -> WarmResult {
        info!("Startup cache warming for {} assets", self.warm_set().len());
        self.warm_cache(&self.warm_set(), false).await
    }

    /// Warm an arbitrary asset list, a few assets in flight at a time.
    ///
    /// Without `force`, assets whose cached price entry is still fresh are
    /// skipped rather than re-fetched. With `force`, fresh entries are
    /// invalidated first so the resolve reaches a live provider.
    pub async fn warm_cache(&self, assets: &[Asset], force: bool) -> WarmResult {
        let outcomes: Vec<WarmOutcome> = stream::iter(assets.iter().cloned())
            .map(|asset| self.warm_one(asset, force))
            .buffer_unordered(WARM_CONCURRENCY)
            .collect()
            .await;

        let mut result = WarmResult::default();
        for outcome in outcomes {
            match outcome {
                WarmOutcome::Skipped => result.skipped += 1,
                WarmOutcome::Succeeded => {
                    result.attempted += 1;
                    result.succeeded += 1;
                }
                WarmOutcome::Failed => {
                    result.attempted += 1;
                    result.failed += 1;
                }
            }
        }

        info!(
            "Warming run finished: {} attempted, {} succeeded, {} failed, {} skipped",
            result.attempted, result.succeeded, result.failed, result.skipped
        );
        result
    }

    async fn warm_one(&self, asset: Asset, force: bool) -> WarmOutcome {
        let request = DataRequest::new(asset.clone(), DataType::Price);

        if force {
            self.engine.cache().invalidate(&request.cache_key()).await;
        } else if let Some(entry) = self.engine.cache().get(&request.cache_key()).await {
            debug!(
                "Skipping warm for '{}': entry fresh for {}s more",
                asset.symbol,
                entry.remaining_secs()
            );
            return WarmOutcome::Skipped;
        }

        match self.engine.resolve(&request).await {
            Ok(resolved) => {
                debug!(
                    "Warmed '{}' via '{}'",
                    asset.symbol, resolved.provenance.provider
                );
                WarmOutcome::Succeeded
            }
            Err(e) => {
                warn!("Warming failed for '{}': {}", asset.symbol, e);
                WarmOutcome::Failed
            }
        }
    }

    /// Spawn the recurring warming loop.
    ///
    /// A tick that fires while the previous run is still in flight is
    /// skipped, not queued. Returns `None` when warming is disabled.
    pub fn spawn_scheduled(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.settings.enabled {
            info!("Scheduled cache warming disabled");
            return None;
        }

        let interval = Duration::from_secs(self.settings.interval_seconds);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick duplicates startup warming.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if self
                    .in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    warn!("Previous warming run still in flight, skipping tick");
                    continue;
                }
                self.warm_cache(&self.warm_set(), false).await;
                self.in_flight.store(false, Ordering::SeqCst);
            }
        }))
    }
}

/// Best-effort classification of a warm-list symbol.
fn classify_symbol(symbol: &str) -> Asset {
    if symbol.starts_with('^') {
        Asset::us(symbol, AssetClass::Index)
    } else if symbol.contains("-USD") {
        Asset::new(symbol, AssetClass::Crypto, "GLOBAL", "USD")
    } else {
        Asset::us(symbol, AssetClass::Equity)
    }
}
