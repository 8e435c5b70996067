//! AMM cycle arbitrage strategy
//!
//! 틱마다 풀 그래프를 구성하고 순환 경로를 열거한 뒤, 경로별로 최적 입력을 찾고
//! 슬리피지/유동성 한도에 맞게 줄입니다. 가스 비용을 뺀 순이익이 가장 큰 경로가
//! 하나의 `Opportunity`가 됩니다. 가스 가격 상한, 최소 순이익, 슬리피지 한도를 넘는
//! 후보는 기회로 보고하지 않습니다.

pub mod optimizer;
pub mod path;
pub mod price_cache;
pub mod risk;

use async_trait::async_trait;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::StrategyConfig;
use crate::constants::*;
use crate::core::bundle::{Bundle, BundleBuilder};
use crate::monitoring::{Counter, Gauge, Histogram, MetricsSink};
use crate::strategies::base::StrategyCore;
use crate::strategies::traits::Strategy;
use crate::types::*;

use optimizer::{find_optimal_input, path_profit, simulate_path};
use path::{enumerate_paths, PoolGraph};
use price_cache::PriceCache;
use risk::{assess, constrain_input, estimate_path_gas, RiskAssessment};

pub use path::PathSearch;

pub const STRATEGY_NAME: &str = "arbitrage";

#[derive(Debug, Clone)]
struct ArbitrageMetrics {
    cross_dex_paths: Counter,
    triangular_paths: Counter,
    complex_paths: Counter,
    path_length: Histogram,
    active_pools: Gauge,
}

impl ArbitrageMetrics {
    fn new(sink: &dyn MetricsSink) -> Self {
        Self {
            cross_dex_paths: sink.counter("arbitrage_cross_dex_paths_total", "Cross-DEX paths enumerated"),
            triangular_paths: sink.counter("arbitrage_triangular_paths_total", "Triangular paths enumerated"),
            complex_paths: sink.counter("arbitrage_complex_paths_total", "Complex paths enumerated"),
            path_length: sink.histogram(
                "arbitrage_path_length",
                "Hop count of profitable paths",
                &[2.0, 3.0, 4.0, 5.0, 6.0, 8.0],
            ),
            active_pools: sink.gauge("arbitrage_active_pools", "Pools eligible for path search"),
        }
    }
}

/// 수익 평가를 통과한 경로
#[derive(Debug, Clone)]
struct Candidate {
    path: ArbitragePath,
    amount_in: f64,
    hop_outputs: Vec<f64>,
    risk: RiskAssessment,
}

pub struct ArbitrageStrategy {
    core: StrategyCore,
    price_cache: RwLock<PriceCache>,
    last_seen_block: AtomicU64,
    metrics: ArbitrageMetrics,
}

impl ArbitrageStrategy {
    pub fn new(config: StrategyConfig, sink: &dyn MetricsSink) -> Self {
        let ttl = Duration::from_millis(config.price_cache_ttl_ms);
        Self {
            core: StrategyCore::new(STRATEGY_NAME, config, sink),
            price_cache: RwLock::new(PriceCache::new(ttl)),
            last_seen_block: AtomicU64::new(0),
            metrics: ArbitrageMetrics::new(sink),
        }
    }

    pub fn with_max_bundle_transactions(mut self, max: usize) -> Self {
        self.core = self.core.with_max_bundle_transactions(max);
        self
    }

    pub fn last_seen_block(&self) -> u64 {
        self.last_seen_block.load(Ordering::Acquire)
    }

    fn record_search(&self, search: &PathSearch) {
        self.metrics.cross_dex_paths.inc_by(search.count(PathKind::CrossDex) as u64);
        self.metrics.triangular_paths.inc_by(search.count(PathKind::Triangular) as u64);
        self.metrics.complex_paths.inc_by(search.count(PathKind::Complex) as u64);
    }

    /// 경로 하나의 크기 결정과 수익성 평가. 통과하지 못하면 None
    fn evaluate(
        &self,
        mut path: ArbitragePath,
        config: &StrategyConfig,
        cache: &PriceCache,
        gas_price_gwei: f64,
        now: Instant,
    ) -> Option<Candidate> {
        path.gas_estimate = estimate_path_gas(&path);
        if path.gas_estimate > config.gas_limit {
            return None;
        }

        let (optimum, _) = find_optimal_input(&path, TERNARY_SEARCH_ITERATIONS);
        let amount_in = constrain_input(&path, optimum, config.max_slippage_percent, config.max_reserve_fraction)?;
        let profit_tokens = path_profit(&path, amount_in);
        if profit_tokens <= 0.0 {
            return None;
        }

        let start = path.start_token()?;
        let price_eth = match cache.get_at(start, now) {
            Some(price) => price,
            None => {
                debug!("💤 {} 가격 없음 (캐시 만료), 경로 건너뜀: {}", start, path.describe());
                return None;
            }
        };

        let profit_eth = profit_tokens * price_eth;
        let risk = assess(
            &path,
            amount_in,
            profit_eth,
            gas_price_gwei,
            config.max_slippage_percent,
            config.max_reserve_fraction,
        );
        if !risk.survives_gas() {
            return None;
        }

        let hop_outputs = simulate_path(&path, amount_in)?;
        path.required_input = amount_in;
        path.expected_profit = profit_tokens;

        Some(Candidate { path, amount_in, hop_outputs, risk })
    }
}

#[async_trait]
impl Strategy for ArbitrageStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    async fn initialize(&self) -> Result<()> {
        let config = self.core.config().await;
        info!(
            "🔄 아비트래지 전략 초기화: max_path_length={}, dexes={:?}, base_tokens={:?}",
            config.max_path_length, config.target_dexes, config.base_tokens
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        info!("⏹️ 아비트래지 전략 종료");
        Ok(())
    }

    async fn reset(&self) {
        self.core.reset_stats().await;
        self.price_cache.write().await.clear();
        self.last_seen_block.store(0, Ordering::Release);
    }

    async fn update_config(&self, config: StrategyConfig) {
        self.price_cache
            .write()
            .await
            .set_ttl(Duration::from_millis(config.price_cache_ttl_ms));
        self.core.update_config(config).await;
    }

    async fn detect_opportunity(&self, context: &StrategyContext) -> Result<Option<Opportunity>> {
        let config = self.core.config().await;
        self.last_seen_block.fetch_max(context.block_number, Ordering::AcqRel);

        let now = Instant::now();
        let cache = {
            let mut cache = self.price_cache.write().await;
            cache.refresh_at(context, now);
            cache.clone()
        };

        if !self.core.is_gas_price_acceptable(context.gas_price_gwei).await {
            debug!(
                "⛽ 가스 가격 {:.1} gwei 가 상한 {:.1} gwei 초과, 탐지 건너뜀",
                context.gas_price_gwei, config.max_gas_price_gwei
            );
            return Ok(None);
        }

        // 이번 블록에 빠진 풀은 TTL 안의 캐시 값으로 보충
        let graph = PoolGraph::build(cache.pools_at(now), &config);
        self.metrics.active_pools.set(graph.pool_count() as f64);
        if graph.pool_count() < 2 {
            return Ok(None);
        }

        let base_tokens = if config.base_tokens.is_empty() {
            graph.tokens()
        } else {
            config.base_tokens.clone()
        };

        let search = enumerate_paths(&graph, &base_tokens, config.max_path_length, &context.cancel);
        if search.cancelled {
            debug!("🛑 경로 탐색 취소됨 (블록 {}, 후보 {}개)", context.block_number, search.candidates_visited);
            return Ok(None);
        }
        self.record_search(&search);

        let best = search
            .paths
            .into_iter()
            .filter_map(|path| self.evaluate(path, &config, &cache, context.gas_price_gwei, now))
            .max_by(|a, b| a.risk.net_profit_eth().total_cmp(&b.risk.net_profit_eth()));

        let candidate = match best {
            Some(candidate) => candidate,
            None => return Ok(None),
        };

        debug!(
            "💡 아비트래지 경로 발견: {} (입력 {:.6}, 순이익 {:.6} ETH, 리스크 {:.3})",
            candidate.path.describe(),
            candidate.amount_in,
            candidate.risk.net_profit_eth(),
            candidate.risk.score
        );

        let details = ArbitrageDetails {
            amount_in: candidate.amount_in,
            hop_outputs: candidate.hop_outputs,
            risk_score: candidate.risk.score,
            path: candidate.path,
        };

        let opportunity = Opportunity::new(STRATEGY_NAME, context.block_number, OpportunityDetails::Arbitrage(details.clone()))
            .with_profit(candidate.risk.profit_eth, candidate.risk.gas_cost_eth)
            .with_gas(details.path.gas_estimate, context.gas_price_gwei)
            .with_slippage(candidate.risk.slippage_percent)
            .with_metadata("path", details.path.describe())
            .with_metadata("kind", format!("{:?}", details.path.kind))
            .with_metadata("amount_in", details.amount_in)
            .with_metadata("risk_score", format!("{:.4}", details.risk_score))
            .with_metadata("max_reserve_usage", format!("{:.4}", candidate.risk.max_reserve_usage));

        if !self.core.is_profitable(&opportunity).await {
            debug!(
                "💸 순이익 {:.6} ETH 가 최소 {:.6} ETH 미만: {}",
                opportunity.net_profit_eth,
                config.min_profit_eth,
                details.path.describe()
            );
            return Ok(None);
        }
        if !self.core.is_slippage_acceptable(opportunity.slippage_percent).await {
            debug!("📉 슬리피지 {:.3}% 초과: {}", opportunity.slippage_percent, details.path.describe());
            return Ok(None);
        }

        self.metrics.path_length.observe(details.path.hop_count() as f64);
        Ok(Some(opportunity))
    }

    async fn execute_opportunity(&self, opportunity: &Opportunity) -> std::result::Result<Bundle, StrategyResult> {
        let details = match opportunity.arbitrage_details() {
            Some(details) => details,
            None => {
                warn!("⚠️ 아비트래지가 아닌 기회: {}", opportunity.id);
                return Err(StrategyResult::Failed);
            }
        };

        let validation = self.core.validate_opportunity(opportunity).await;
        if validation != StrategyResult::Success {
            debug!("❌ 기회 검증 실패 ({}): {}", validation, opportunity.id);
            return Err(validation);
        }

        let last_seen = self.last_seen_block();
        if opportunity.block_number < last_seen {
            debug!("⏰ 오래된 기회: 블록 {} < {}", opportunity.block_number, last_seen);
            return Err(StrategyResult::Failed);
        }

        let hops = match details.path.hops() {
            Some(hops) if hops.len() == details.hop_outputs.len() => hops,
            _ => return Err(StrategyResult::Failed),
        };

        let config = self.core.config().await;
        let min_out_factor = 1.0 - config.max_slippage_percent / 100.0;
        let mut builder = BundleBuilder::for_opportunity(opportunity, config.bundle_timeout_ms);
        let mut amount_in = details.amount_in;

        for (i, ((pool, a_to_b), expected_out)) in hops.into_iter().zip(&details.hop_outputs).enumerate() {
            let (token_in, token_out) = if a_to_b {
                (&pool.token_a, &pool.token_b)
            } else {
                (&pool.token_b, &pool.token_a)
            };
            // 첫 트랜잭션이 고정 오버헤드를 부담
            let gas_limit = if i == 0 {
                pool.dex.swap_gas() + BASE_TX_GAS + ARBITRAGE_OVERHEAD_GAS
            } else {
                pool.dex.swap_gas()
            };
            let tx = Transaction::swap(
                pool,
                token_in,
                token_out,
                amount_in,
                expected_out * min_out_factor,
                gas_limit,
                opportunity.gas_price_gwei,
                builder.next_nonce(),
            );
            builder = builder.push(tx);
            amount_in = *expected_out;
        }

        Ok(builder.build())
    }
}

impl std::fmt::Debug for ArbitrageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbitrageStrategy")
            .field("core", &self.core)
            .field("last_seen_block", &self.last_seen_block())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::{DexKind, LiquidityPool};
    use crate::monitoring::MetricsRegistry;
    use crate::strategies::StrategyEngine;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn scenario_context(ca: (f64, f64), gas_price_gwei: f64) -> StrategyContext {
        let snapshot = MarketSnapshot {
            block_number: 100,
            block_timestamp: 1_700_000_000,
            gas_price_gwei,
            base_fee_gwei: gas_price_gwei,
            priority_fee_gwei: 0.0,
            mempool_transactions: Vec::new(),
            token_prices: HashMap::from([("A".to_string(), 1.0)]),
            pools: vec![
                LiquidityPool::new("0xab", "A", "B", DexKind::UniswapV2, 1000.0, 1000.0, 0.3).unwrap(),
                LiquidityPool::new("0xbc", "B", "C", DexKind::UniswapV2, 500.0, 2000.0, 0.3).unwrap(),
                LiquidityPool::new("0xca", "C", "A", DexKind::UniswapV2, ca.0, ca.1, 0.3).unwrap(),
            ],
        };
        StrategyContext::from_snapshot(snapshot, CancellationToken::new())
    }

    fn strategy(registry: &MetricsRegistry) -> ArbitrageStrategy {
        let config = StrategyConfig { base_tokens: vec!["A".to_string()], ..Default::default() };
        ArbitrageStrategy::new(config, registry)
    }

    #[tokio::test]
    async fn test_balanced_scenario_yields_nothing() {
        let registry = MetricsRegistry::new();
        let strategy = strategy(&registry);
        let result = strategy.detect_opportunity(&scenario_context((2000.0, 500.0), 1.0)).await.unwrap();
        assert!(result.is_none());
        // 두 방향 모두 열거는 됨
        assert_eq!(registry.snapshot().counters["arbitrage_triangular_paths_total"], 2);
    }

    #[tokio::test]
    async fn test_perturbed_scenario_detects_and_executes() {
        let registry = MetricsRegistry::new();
        let strategy = strategy(&registry);
        let opp = strategy
            .detect_opportunity(&scenario_context((2000.0, 600.0), 1.0))
            .await
            .unwrap()
            .expect("profitable cycle");

        assert_eq!(opp.block_number, 100);
        assert!(opp.is_profitable());
        assert!(opp.slippage_percent <= 0.5);
        assert_eq!(opp.metadata["path"], "A -> B -> C -> A");

        let details = opp.arbitrage_details().unwrap();
        assert!(details.path.is_valid());
        assert!(details.amount_in > 0.0 && details.amount_in < 1000.0);
        assert!(details.risk_score >= 0.0 && details.risk_score <= 1.0);

        let bundle = strategy.execute_opportunity(&opp).await.unwrap();
        assert_eq!(bundle.len(), 3);
        assert_eq!(bundle.target_block(), 101);
        assert_eq!(bundle.timeout_ms(), DEFAULT_BUNDLE_TIMEOUT_MS);
        assert_eq!(bundle.total_gas_limit(), opp.gas_limit);
        assert!(strategy.core().validate_bundle(&bundle).await);

        let txs = bundle.transactions();
        assert_eq!(txs[0].token_in, "A");
        assert_eq!(txs[2].token_out, "A");
        assert!((txs[1].amount_in - details.hop_outputs[0]).abs() < 1e-12);
        assert!((txs[2].min_amount_out - details.hop_outputs[2] * 0.995).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_price_means_no_opportunity() {
        let registry = MetricsRegistry::new();
        let strategy = strategy(&registry);
        let mut context = scenario_context((2000.0, 600.0), 1.0);
        context.token_prices.clear();
        assert!(strategy.detect_opportunity(&context).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_high_gas_price_kills_opportunity() {
        let registry = MetricsRegistry::new();
        let strategy = strategy(&registry);
        // 396k gas * 1000 gwei = 0.396 ETH > 약 0.18 ETH 수익
        let result = strategy.detect_opportunity(&scenario_context((2000.0, 600.0), 1000.0)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_gas_price_above_cap_is_not_reported() {
        let registry = MetricsRegistry::new();
        let strategy = strategy(&registry);
        // 150 gwei 에서도 순이익은 양수지만 상한 100 gwei 를 넘음
        let result = strategy.detect_opportunity(&scenario_context((2000.0, 600.0), 150.0)).await.unwrap();
        assert!(result.is_none());

        // 상한과 같은 가격은 허용
        let opp = strategy
            .detect_opportunity(&scenario_context((2000.0, 600.0), 100.0))
            .await
            .unwrap()
            .expect("gas price at cap");
        assert_eq!(opp.gas_price_gwei, 100.0);
        assert!(opp.is_within_gas_limit(100.0));
    }

    #[tokio::test]
    async fn test_below_min_profit_is_not_reported() {
        let registry = MetricsRegistry::new();
        let config = StrategyConfig {
            base_tokens: vec!["A".to_string()],
            min_profit_eth: 5.0,
            ..Default::default()
        };
        let strategy = ArbitrageStrategy::new(config, &registry);
        let result = strategy.detect_opportunity(&scenario_context((2000.0, 600.0), 1.0)).await.unwrap();
        assert!(result.is_none());
        assert_eq!(registry.snapshot().histograms["arbitrage_path_length"].count, 0);
    }

    #[tokio::test]
    async fn test_filtered_candidates_leave_engine_stats_clean() {
        let registry = MetricsRegistry::new();
        let mut engine = StrategyEngine::new(&registry);
        engine.register(Arc::new(strategy(&registry))).unwrap();

        let report = engine.run_tick(&scenario_context((2000.0, 600.0), 150.0)).await;
        assert_eq!(report.outcome(STRATEGY_NAME).unwrap().result, StrategyResult::NoOpportunity);
        assert!(report.bundles.is_empty());

        let (_, stats) = engine.stats_snapshot().await.remove(0);
        assert_eq!(stats.opportunities_detected, 0);
        assert_eq!(stats.failed_executions, 0);
    }

    #[tokio::test]
    async fn test_missing_pool_uses_cached_state() {
        let registry = MetricsRegistry::new();
        let strategy = strategy(&registry);
        let first = scenario_context((2000.0, 600.0), 1.0);
        assert!(strategy.detect_opportunity(&first).await.unwrap().is_some());

        // 다음 블록 스냅샷에서 C/A 풀 조회가 빠짐
        let mut second = scenario_context((2000.0, 600.0), 1.0);
        second.block_number = 101;
        second.dex_liquidity.remove("0xca");
        let opp = strategy
            .detect_opportunity(&second)
            .await
            .unwrap()
            .expect("cached pool fills the gap");
        assert_eq!(opp.block_number, 101);
        assert_eq!(opp.metadata["path"], "A -> B -> C -> A");
    }

    #[tokio::test]
    async fn test_expired_pool_is_dropped() {
        let registry = MetricsRegistry::new();
        let config = StrategyConfig {
            base_tokens: vec!["A".to_string()],
            price_cache_ttl_ms: 1,
            ..Default::default()
        };
        let strategy = ArbitrageStrategy::new(config, &registry);
        assert!(strategy
            .detect_opportunity(&scenario_context((2000.0, 600.0), 1.0))
            .await
            .unwrap()
            .is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut later = scenario_context((2000.0, 600.0), 1.0);
        later.dex_liquidity.remove("0xca");
        assert!(strategy.detect_opportunity(&later).await.unwrap().is_none());
        assert_eq!(registry.snapshot().gauges["arbitrage_active_pools"], 2.0);
    }

    #[tokio::test]
    async fn test_execution_rejects_stale_and_invalid() {
        let registry = MetricsRegistry::new();
        let strategy = strategy(&registry);
        let opp = strategy
            .detect_opportunity(&scenario_context((2000.0, 600.0), 1.0))
            .await
            .unwrap()
            .unwrap();

        let mut later = scenario_context((2000.0, 500.0), 1.0);
        later.block_number = 105;
        strategy.detect_opportunity(&later).await.unwrap();
        assert_eq!(strategy.execute_opportunity(&opp).await.unwrap_err(), StrategyResult::Failed);

        let mut config = strategy.core().config().await;
        config.min_profit_eth = 10.0;
        strategy.update_config(config).await;
        let fresh = Opportunity { block_number: 200, ..opp.clone() };
        assert_eq!(
            strategy.execute_opportunity(&fresh).await.unwrap_err(),
            StrategyResult::InsufficientProfit
        );

        let generic = Opportunity::new(STRATEGY_NAME, 300, OpportunityDetails::Generic { description: String::new() });
        assert_eq!(strategy.execute_opportunity(&generic).await.unwrap_err(), StrategyResult::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_context_returns_none() {
        let registry = MetricsRegistry::new();
        let strategy = strategy(&registry);
        let context = scenario_context((2000.0, 600.0), 1.0);
        context.cancel.cancel();
        assert!(strategy.detect_opportunity(&context).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dex_allow_list_filters_pools() {
        let registry = MetricsRegistry::new();
        let config = StrategyConfig {
            base_tokens: vec!["A".to_string()],
            target_dexes: vec![DexKind::Curve],
            ..Default::default()
        };
        let strategy = ArbitrageStrategy::new(config, &registry);
        let result = strategy.detect_opportunity(&scenario_context((2000.0, 600.0), 1.0)).await.unwrap();
        assert!(result.is_none());
        assert_eq!(registry.snapshot().gauges["arbitrage_active_pools"], 0.0);
    }

    #[tokio::test]
    async fn test_reset_twice_equals_once() {
        let registry = MetricsRegistry::new();
        let strategy = strategy(&registry);
        strategy.detect_opportunity(&scenario_context((2000.0, 600.0), 1.0)).await.unwrap();
        strategy.core().record_detected().await;

        strategy.reset().await;
        let once = (strategy.stats().await, strategy.last_seen_block(), strategy.price_cache.read().await.len());
        strategy.reset().await;
        let twice = (strategy.stats().await, strategy.last_seen_block(), strategy.price_cache.read().await.len());
        assert_eq!(once, twice);
        assert_eq!(once.1, 0);
        // 설정은 유지
        assert_eq!(strategy.core().config().await.base_tokens, vec!["A".to_string()]);
    }
}
