//! The arbitration engine: scores candidate providers, builds an ordered
//! execution plan, and executes it with cache-first reads and
//! fallback-on-failure writes.

mod scoring;
mod stats;
mod ttl;

pub use stats::{ProviderStatsSnapshot, ProviderStatsStore};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};

use crate::cache::CacheManager;
use crate::config::ArbiterConfig;
use crate::errors::{ArbiterError, ProviderFailure, RetryClass};
use crate::models::{CacheEntry, DataRequest, ExecutionPlan, Provenance, Resolved};
use crate::provider::{DataProvider, HealthStatus, ProviderHealth, ProviderRegistry};

use scoring::{order_scores, score_provider, ScoringInputs};

/// Resolves data requests against the provider pool with bounded latency.
///
/// Every resolved value carries provenance; a caller either gets a value
/// that names its source, or a single typed error describing why no value
/// could be obtained.
pub struct ArbitrationEngine {
    registry: Arc<ProviderRegistry>,
    cache: Arc<CacheManager>,
    stats: Arc<ProviderStatsStore>,
    config: ArbiterConfig,
    /// Health snapshots cached briefly so scoring doesn't hammer
    /// `health()` on every request.
    health_snapshots: DashMap<String, (Instant, ProviderHealth)>,
}

impl ArbitrationEngine {
    /// Construct an engine, validating the configuration.
    ///
    /// Invalid configuration fails here, before any traffic is served.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        cache: Arc<CacheManager>,
        config: ArbiterConfig,
    ) -> Result<Self, ArbiterError> {
        config.validate()?;
        let stats = Arc::new(ProviderStatsStore::new(
            config.reliability_window,
            config.reliability_prior,
            config.reliability_prior_weight,
            config.degraded_failure_threshold,
        ));
        Ok(Self {
            registry,
            cache,
            stats,
            config,
            health_snapshots: DashMap::new(),
        })
    }

    /// The cache manager this engine writes through.
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Per-provider rolling performance snapshots.
    pub fn provider_report(&self) -> Vec<ProviderStatsSnapshot> {
        self.stats.report()
    }

    /// Resolve a request to a value with provenance.
    ///
    /// Cache-first: a valid cached entry short-circuits without touching
    /// any provider. On a miss the scored plan is executed sequentially;
    /// the first success is written back through both cache tiers.
    pub async fn resolve(&self, request: &DataRequest) -> Result<Resolved, ArbiterError> {
        let alias_key = request.cache_key();

        if let Some(entry) = self.cache.get(&alias_key).await {
            debug!(
                "Cache hit for '{}' (source: {})",
                alias_key, entry.source_provider
            );
            return Ok(Resolved {
                value: entry.value,
                provenance: Provenance::cache(entry.source_provider),
            });
        }

        let plan = self.build_plan(request)?;
        debug!(
            "Executing plan for '{}': {:?}",
            alias_key,
            plan.provider_ids()
        );

        let mut attempts: Vec<ProviderFailure> = Vec::with_capacity(plan.len());

        for scored in &plan.entries {
            let Some(provider) = self.registry.get(&scored.provider) else {
                // Registry changed under us; treat as a skipped entry.
                attempts.push(ProviderFailure {
                    provider: scored.provider.clone(),
                    error: "provider no longer registered".to_string(),
                });
                continue;
            };

            let call_timeout = self.timeout_for(&scored.provider);
            let started = Instant::now();

            match tokio::time::timeout(call_timeout, provider.fetch(request)).await {
                Ok(Ok(response)) => {
                    let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
                    self.stats.record_success(&scored.provider, latency_ms);

                    let ttl_seconds = ttl::ttl_for(
                        &self.config.ttl,
                        request.data_type,
                        request.asset.class,
                        response.volatility_pct,
                        Utc::now(),
                    );

                    let entry = CacheEntry::new(
                        alias_key.clone(),
                        response.value.clone(),
                        response.confidence,
                        ttl_seconds,
                        scored.provider.clone(),
                    );
                    let mut attributed = entry.clone();
                    attributed.key = request.provider_key(&scored.provider);
                    self.cache.set_batch(vec![entry, attributed]);

                    info!(
                        "Resolved '{}' via '{}' in {:.0}ms (ttl {}s)",
                        alias_key, scored.provider, latency_ms, ttl_seconds
                    );
                    return Ok(Resolved {
                        value: response.value,
                        provenance: Provenance::provider(scored.provider.clone(), scored.composite),
                    });
                }
                Ok(Err(error)) => {
                    if error.retry_class() == RetryClass::FailoverWithPenalty {
                        self.stats.record_failure(&scored.provider);
                    }
                    warn!(
                        "Provider '{}' failed for '{}': {}, trying next",
                        scored.provider, alias_key, error
                    );
                    attempts.push(ProviderFailure {
                        provider: scored.provider.clone(),
                        error: error.to_string(),
                    });
                }
                Err(_) => {
                    self.stats.record_failure(&scored.provider);
                    let error = ArbiterError::Timeout {
                        provider: scored.provider.clone(),
                    };
                    warn!(
                        "Provider '{}' timed out after {:?} for '{}', trying next",
                        scored.provider, call_timeout, alias_key
                    );
                    attempts.push(ProviderFailure {
                        provider: scored.provider.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        warn!(
            "Plan exhausted for '{}' after {} attempts",
            alias_key,
            attempts.len()
        );
        Err(ArbiterError::AllProvidersFailed { attempts })
    }

    /// Score and order candidates without executing anything.
    pub fn get_plan_preview(&self, request: &DataRequest) -> Result<ExecutionPlan, ArbiterError> {
        self.build_plan(request)
    }

    fn build_plan(&self, request: &DataRequest) -> Result<ExecutionPlan, ArbiterError> {
        let candidates = self.registry.providers_for(&request.asset);
        let max_staleness = self.config.staleness.budget_for(request.data_type);

        let mut scores = Vec::with_capacity(candidates.len());
        for provider in &candidates {
            let health = self.health_snapshot(provider);
            let status = self.stats.effective_status(provider.id(), health.status);
            if status == HealthStatus::Down {
                debug!("Skipping provider '{}': down", provider.id());
                continue;
            }

            scores.push(score_provider(
                &ScoringInputs {
                    provider: provider.id(),
                    status,
                    health,
                    reliability: self.stats.reliability(provider.id()),
                    observed_p95_ms: self.stats.p95_latency_ms(provider.id()),
                    cost: provider.cost_score(),
                    max_staleness_secs: max_staleness,
                    latency_budget_ms: self.config.latency_budget_ms,
                },
                &self.config.weights,
            ));
        }

        if scores.is_empty() {
            return Err(ArbiterError::NoProviderAvailable {
                symbol: request.asset.symbol.clone(),
            });
        }

        order_scores(&mut scores, &self.config.provider_priority);
        scores.truncate(1 + self.config.fallback_count);
        Ok(ExecutionPlan { entries: scores })
    }

    /// Fetch a provider's health, reusing a recent snapshot when one is
    /// within the configured TTL.
    fn health_snapshot(&self, provider: &Arc<dyn DataProvider>) -> ProviderHealth {
        let ttl = Duration::from_millis(self.config.health_snapshot_ttl_ms);
        if let Some(cached) = self.health_snapshots.get(provider.id()) {
            let (taken, health) = *cached;
            if taken.elapsed() < ttl {
                return health;
            }
        }
        let health = provider.health();
        self.health_snapshots
            .insert(provider.id().to_string(), (Instant::now(), health));
        health
    }

    /// Per-call timeout: observed p95 plus margin when history exists,
    /// clamped to the configured bounds; the default otherwise.
    fn timeout_for(&self, provider: &str) -> Duration {
        let t = &self.config.timeouts;
        let ms = match self.stats.p95_latency_ms(provider) {
            Some(p95) => ((p95 * t.margin_factor) as u64).clamp(t.min_ms, t.max_ms),
            None => t.default_ms,
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NullTier;
    use crate::config::{CacheSettings, TimeoutSettings};
    use crate::models::{Asset, AssetClass, DataSource, DataType};
    use crate::provider::ProviderResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Succeed(serde_json::Value),
        Error,
        Hang,
    }

    struct MockProvider {
        id: &'static str,
        health: ProviderHealth,
        cost: f64,
        behavior: Behavior,
        call_count: AtomicUsize,
    }

    impl MockProvider {
        fn succeeding(id: &'static str, value: serde_json::Value) -> Self {
            Self::new(id, ProviderHealth::healthy(), Behavior::Succeed(value))
        }

        fn new(id: &'static str, health: ProviderHealth, behavior: Behavior) -> Self {
            Self {
                id,
                health,
                cost: 1.0,
                behavior,
                call_count: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DataProvider for MockProvider {
        fn id(&self) -> &'static str {
            self.id
        }

        fn supports_asset(&self, _asset: &Asset) -> bool {
            true
        }

        fn health(&self) -> ProviderHealth {
            self.health
        }

        fn cost_score(&self) -> f64 {
            self.cost
        }

        async fn fetch(&self, _request: &DataRequest) -> Result<ProviderResponse, ArbiterError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed(value) => Ok(ProviderResponse::new(value.clone())),
                Behavior::Error => Err(ArbiterError::Provider {
                    provider: self.id.to_string(),
                    message: "mock failure".to_string(),
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    unreachable!("hung provider should have timed out")
                }
            }
        }
    }

    fn engine_with(providers: Vec<Arc<MockProvider>>, config: ArbiterConfig) -> ArbitrationEngine {
        let dyn_providers: Vec<Arc<dyn DataProvider>> = providers
            .into_iter()
            .map(|p| p as Arc<dyn DataProvider>)
            .collect();
        let registry = Arc::new(ProviderRegistry::new(dyn_providers));
        let cache = Arc::new(CacheManager::new(
            &CacheSettings::default(),
            Arc::new(NullTier),
        ));
        ArbitrationEngine::new(registry, cache, config).expect("valid config")
    }

    fn fast_timeouts() -> TimeoutSettings {
        TimeoutSettings {
            default_ms: 100,
            min_ms: 20,
            max_ms: 200,
            margin_factor: 2.0,
        }
    }

    fn price_request(symbol: &str) -> DataRequest {
        DataRequest::new(Asset::us(symbol, AssetClass::Equity), DataType::Price)
    }

    #[test]
    fn test_invalid_weights_rejected_at_construction() {
        let registry = Arc::new(ProviderRegistry::new(vec![]));
        let cache = Arc::new(CacheManager::new(
            &CacheSettings::default(),
            Arc::new(NullTier),
        ));
        let mut config = ArbiterConfig::default();
        config.weights.availability = 0.25; // sum now 0.95

        let result = ArbitrationEngine::new(registry, cache, config);
        assert!(matches!(result, Err(ArbiterError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_no_provider_for_asset() {
        let engine = engine_with(vec![], ArbiterConfig::default());
        let result = engine.resolve(&price_request("AAPL")).await;
        assert!(matches!(
            result,
            Err(ArbiterError::NoProviderAvailable { symbol }) if symbol == "AAPL"
        ));
    }

    #[tokio::test]
    async fn test_down_providers_excluded_from_plan() {
        let up = Arc::new(MockProvider::succeeding("UP", json!({"price": 1.0})));
        let down = Arc::new(MockProvider::new(
            "DOWN",
            ProviderHealth::with_status(HealthStatus::Down),
            Behavior::Succeed(json!({"price": 2.0})),
        ));
        let engine = engine_with(vec![Arc::clone(&up), Arc::clone(&down)], ArbiterConfig::default());

        let plan = engine.get_plan_preview(&price_request("AAPL")).unwrap();
        assert_eq!(plan.provider_ids(), vec!["UP"]);
    }

    #[tokio::test]
    async fn test_scoring_determinism_with_ties() {
        // Identical inputs score identically; priority then name break ties.
        let a = Arc::new(MockProvider::succeeding("AAA", json!(1)));
        let b = Arc::new(MockProvider::succeeding("BBB", json!(2)));
        let c = Arc::new(MockProvider::succeeding("CCC", json!(3)));

        let mut config = ArbiterConfig::default();
        config.provider_priority = vec!["BBB".to_string()];
        let engine = engine_with(vec![a, b, c], config);

        for _ in 0..5 {
            let plan = engine.get_plan_preview(&price_request("AAPL")).unwrap();
            assert_eq!(plan.provider_ids(), vec!["BBB", "AAA", "CCC"]);
        }
    }

    #[tokio::test]
    async fn test_degraded_provider_scores_below_healthy() {
        let healthy = Arc::new(MockProvider::succeeding("HEALTHY", json!(1)));
        let degraded = Arc::new(MockProvider::new(
            "ADEGRADED",
            ProviderHealth::with_status(HealthStatus::Degraded),
            Behavior::Succeed(json!(2)),
        ));
        let engine = engine_with(vec![healthy, degraded], ArbiterConfig::default());

        let plan = engine.get_plan_preview(&price_request("AAPL")).unwrap();
        // "ADEGRADED" sorts before "HEALTHY" lexically, so winning here
        // means the composite did the work.
        assert_eq!(plan.provider_ids(), vec!["HEALTHY", "ADEGRADED"]);
    }

    #[tokio::test]
    async fn test_cache_first_never_calls_providers() {
        let provider = Arc::new(MockProvider::succeeding("ONLY", json!({"price": 42.0})));
        let engine = engine_with(vec![Arc::clone(&provider)], ArbiterConfig::default());
        let request = price_request("AAPL");

        let first = engine.resolve(&request).await.unwrap();
        assert_eq!(first.provenance.source, DataSource::Provider);
        assert_eq!(provider.calls(), 1);

        let second = engine.resolve(&request).await.unwrap();
        assert_eq!(second.provenance.source, DataSource::Cache);
        assert_eq!(second.provenance.provider, "ONLY");
        assert_eq!(second.value, json!({"price": 42.0}));
        // The cached read made zero provider calls.
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_reaches_third_provider() {
        let mut config = ArbiterConfig::default();
        config.timeouts = fast_timeouts();
        config.provider_priority =
            vec!["TIMES_OUT".to_string(), "ERRORS".to_string(), "WORKS".to_string()];

        let times_out = Arc::new(MockProvider::new(
            "TIMES_OUT",
            ProviderHealth::healthy(),
            Behavior::Hang,
        ));
        let errors = Arc::new(MockProvider::new(
            "ERRORS",
            ProviderHealth::healthy(),
            Behavior::Error,
        ));
        let works = Arc::new(MockProvider::succeeding("WORKS", json!({"price": 271.49})));

        let engine = engine_with(
            vec![Arc::clone(&times_out), Arc::clone(&errors), Arc::clone(&works)],
            config,
        );

        let resolved = engine.resolve(&price_request("AAPL")).await.unwrap();
        assert_eq!(resolved.value, json!({"price": 271.49}));
        assert_eq!(resolved.provenance.provider, "WORKS");
        assert_eq!(resolved.provenance.source, DataSource::Provider);
        assert_eq!(times_out.calls(), 1);
        assert_eq!(errors.calls(), 1);
        assert_eq!(works.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_plan_lists_all_attempts_in_order() {
        let mut config = ArbiterConfig::default();
        config.timeouts = fast_timeouts();
        config.provider_priority =
            vec!["FIRST".to_string(), "SECOND".to_string(), "THIRD".to_string()];

        let first = Arc::new(MockProvider::new(
            "FIRST",
            ProviderHealth::healthy(),
            Behavior::Hang,
        ));
        let second = Arc::new(MockProvider::new(
            "SECOND",
            ProviderHealth::healthy(),
            Behavior::Error,
        ));
        let third = Arc::new(MockProvider::new(
            "THIRD",
            ProviderHealth::healthy(),
            Behavior::Error,
        ));

        let engine = engine_with(vec![first, second, third], config);
        let result = engine.resolve(&price_request("AAPL")).await;

        match result {
            Err(ArbiterError::AllProvidersFailed { attempts }) => {
                assert_eq!(attempts.len(), 3);
                assert_eq!(attempts[0].provider, "FIRST");
                assert_eq!(attempts[1].provider, "SECOND");
                assert_eq!(attempts[2].provider, "THIRD");
                assert!(attempts[0].error.contains("Timeout"));
            }
            other => panic!("expected AllProvidersFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_fallback_count_limits_plan() {
        let mut config = ArbiterConfig::default();
        config.fallback_count = 1;

        let providers: Vec<Arc<MockProvider>> = ["P1", "P2", "P3", "P4"]
            .iter()
            .map(|id| Arc::new(MockProvider::succeeding(id, json!(1))))
            .collect();
        let engine = engine_with(providers, config);

        let plan = engine.get_plan_preview(&price_request("AAPL")).unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_failures_mark_provider_degraded() {
        let mut config = ArbiterConfig::default();
        config.timeouts = fast_timeouts();
        config.fallback_count = 0;

        let flaky = Arc::new(MockProvider::new(
            "FLAKY",
            ProviderHealth::healthy(),
            Behavior::Error,
        ));
        let engine = engine_with(vec![Arc::clone(&flaky)], config);

        for _ in 0..3 {
            let _ = engine.resolve(&price_request("TSLA")).await;
        }

        let report = engine.provider_report();
        let snapshot = report.iter().find(|s| s.provider == "FLAKY").unwrap();
        assert!(snapshot.degraded);
        assert_eq!(snapshot.consecutive_failures, 3);

        // Degraded availability halves; composite drops accordingly.
        let plan = engine.get_plan_preview(&price_request("TSLA")).unwrap();
        assert_eq!(plan.entries[0].availability, 0.5);
    }

    #[tokio::test]
    async fn test_resolve_writes_provider_attributed_key() {
        let provider = Arc::new(MockProvider::succeeding("ATTR", json!({"price": 9.0})));
        let engine = engine_with(vec![provider], ArbiterConfig::default());
        let request = price_request("MSFT");

        engine.resolve(&request).await.unwrap();

        let attributed = engine
            .cache()
            .get(&request.provider_key("ATTR"))
            .await
            .expect("provider-scoped entry written");
        assert_eq!(attributed.source_provider, "ATTR");
    }

    #[test]
    fn test_timeout_derived_from_observed_p95() {
        let engine = engine_with(vec![], ArbiterConfig::default());
        for _ in 0..10 {
            engine.stats.record_success("STEADY", 1_000.0);
        }
        // p95 1000ms * margin 2.0 = 2000ms, within [500, 15000].
        assert_eq!(engine.timeout_for("STEADY"), Duration::from_millis(2_000));
        // No history falls back to the default.
        assert_eq!(engine.timeout_for("UNSEEN"), Duration::from_millis(5_000));
    }
}
