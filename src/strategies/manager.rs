use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::bundle::Bundle;
use crate::monitoring::{Counter, Histogram, MetricsSink, DEFAULT_BUCKETS};
use crate::strategies::arbitrage::{self, ArbitrageStrategy};
use crate::strategies::stats::StrategyStats;
use crate::strategies::Strategy;
use crate::types::{SimResult, SimulatorError, StrategyContext, StrategyResult};

/// 한 전략의 틱 결과
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyOutcome {
    pub strategy: String,
    pub result: StrategyResult,
    pub opportunity_id: Option<String>,
    pub expected_profit_eth: f64,
    pub gas_cost_eth: f64,
    pub detection_latency_us: f64,
    pub execution_latency_us: Option<f64>,
}

/// 한 틱 동안 엔진이 만든 결과 모음
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub block_number: u64,
    pub outcomes: Vec<StrategyOutcome>,
    pub bundles: Vec<Bundle>,
    pub latency_us: f64,
}

impl TickReport {
    pub fn strategies_run(&self) -> usize {
        self.outcomes.len()
    }

    pub fn opportunities_detected(&self) -> usize {
        self.outcomes.iter().filter(|o| o.opportunity_id.is_some()).count()
    }

    pub fn successful(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result == StrategyResult::Success).count()
    }

    /// 성공한 실행의 기대 수익 합
    pub fn total_profit_eth(&self) -> f64 {
        self.outcomes
            .iter()
            .filter(|o| o.result == StrategyResult::Success)
            .map(|o| o.expected_profit_eth)
            .sum()
    }

    pub fn total_gas_cost_eth(&self) -> f64 {
        self.outcomes
            .iter()
            .filter(|o| o.result == StrategyResult::Success)
            .map(|o| o.gas_cost_eth)
            .sum()
    }

    pub fn avg_detection_latency_us(&self) -> f64 {
        mean(self.outcomes.iter().map(|o| o.detection_latency_us))
    }

    pub fn avg_execution_latency_us(&self) -> f64 {
        mean(self.outcomes.iter().filter_map(|o| o.execution_latency_us))
    }

    pub fn outcome(&self, strategy: &str) -> Option<&StrategyOutcome> {
        self.outcomes.iter().find(|o| o.strategy == strategy)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone)]
struct EngineMetrics {
    ticks: Counter,
    faults: Counter,
    timeouts: Counter,
    bundles: Counter,
    tick_latency: Histogram,
}

impl EngineMetrics {
    fn new(sink: &dyn MetricsSink) -> Self {
        Self {
            ticks: sink.counter("engine_ticks_total", "Ticks processed by the strategy engine"),
            faults: sink.counter("engine_strategy_faults_total", "Strategy errors and panics"),
            timeouts: sink.counter("engine_execution_timeouts_total", "Executions that hit the bundle timeout"),
            bundles: sink.counter("engine_bundles_total", "Validated bundles produced"),
            tick_latency: sink.histogram("engine_tick_latency_seconds", "Engine tick latency", &DEFAULT_BUCKETS),
        }
    }
}

/// 전략 레지스트리 + 틱 스케줄러
///
/// 전략은 등록 순서대로 하나씩 실행됩니다. 한 전략의 에러나 패닉은 그 전략의
/// 통계에만 기록되고 틱은 계속 진행됩니다.
pub struct StrategyEngine {
    strategies: Vec<Arc<dyn Strategy>>,
    index: HashMap<String, usize>,
    metrics: EngineMetrics,
}

impl StrategyEngine {
    pub fn new(sink: &dyn MetricsSink) -> Self {
        Self {
            strategies: Vec::new(),
            index: HashMap::new(),
            metrics: EngineMetrics::new(sink),
        }
    }

    /// 설정에 있는 알려진 전략들로 레지스트리 구성
    ///
    /// 비활성 전략도 등록되며 `set_strategy_enabled`로 켤 수 있습니다. 활성화된
    /// 알 수 없는 이름은 에러입니다.
    pub fn from_config(config: &Config, sink: &dyn MetricsSink) -> SimResult<Self> {
        let mut engine = Self::new(sink);

        for (name, strategy_config) in &config.strategies {
            match name.as_str() {
                arbitrage::STRATEGY_NAME => {
                    info!("🔄 아비트래지 전략 초기화 중...");
                    let strategy = ArbitrageStrategy::new(strategy_config.clone(), sink)
                        .with_max_bundle_transactions(config.performance.max_bundle_transactions);
                    engine.register(Arc::new(strategy))?;
                }
                unknown if strategy_config.enabled => {
                    error!("❌ 알 수 없는 전략: {}", unknown);
                    return Err(SimulatorError::UnknownStrategy(unknown.to_string()));
                }
                unknown => {
                    warn!("⚠️ 비활성화된 알 수 없는 전략 무시: {}", unknown);
                }
            }
        }

        info!("📊 총 {}개 전략 등록됨 ({}개 활성)", engine.len(), engine.enabled_count());
        Ok(engine)
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) -> SimResult<()> {
        let name = strategy.name().to_string();
        if self.index.contains_key(&name) {
            return Err(SimulatorError::DuplicateStrategy(name));
        }
        self.index.insert(name.clone(), self.strategies.len());
        self.strategies.push(strategy);
        debug!("✅ 전략 등록: {}", name);
        Ok(())
    }

    pub fn strategy(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.index.get(name).map(|&idx| Arc::clone(&self.strategies[idx]))
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.strategies.iter().filter(|s| s.is_enabled()).count()
    }

    pub fn set_strategy_enabled(&self, name: &str, enabled: bool) -> SimResult<()> {
        let strategy = self
            .strategy(name)
            .ok_or_else(|| SimulatorError::UnknownStrategy(name.to_string()))?;
        strategy.set_enabled(enabled);
        info!("🔧 전략 {} {}", name, if enabled { "활성화" } else { "비활성화" });
        Ok(())
    }

    /// 모든 전략 초기화. 첫 실패에서 중단
    pub async fn initialize_all(&self) -> SimResult<()> {
        for strategy in &self.strategies {
            strategy.initialize().await.map_err(|e| SimulatorError::StrategyInit {
                name: strategy.name().to_string(),
                reason: format!("{:#}", e),
            })?;
        }
        info!("✅ {}개 전략 초기화 완료", self.strategies.len());
        Ok(())
    }

    /// 모든 전략 종료. 실패는 로그만 남기고 계속
    pub async fn shutdown_all(&self) {
        for strategy in &self.strategies {
            if let Err(e) = strategy.shutdown().await {
                error!("❌ 전략 {} 종료 실패: {:#}", strategy.name(), e);
            }
        }
        info!("⏹️ 모든 전략 종료");
    }

    pub async fn reset_all(&self) {
        for strategy in &self.strategies {
            strategy.reset().await;
        }
        debug!("🔄 모든 전략 초기화");
    }

    /// 등록 순서대로 (이름, 통계)
    pub async fn stats_snapshot(&self) -> Vec<(String, StrategyStats)> {
        let mut snapshot = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            snapshot.push((strategy.name().to_string(), strategy.stats().await));
        }
        snapshot
    }

    pub async fn print_stats(&self) {
        for (name, stats) in self.stats_snapshot().await {
            stats.print_stats(&name);
        }
    }

    /// 활성 전략을 등록 순서대로 실행
    pub async fn run_tick(&self, context: &StrategyContext) -> TickReport {
        let tick_start = Instant::now();
        let mut report = TickReport {
            block_number: context.block_number,
            ..Default::default()
        };

        for strategy in self.strategies.iter().filter(|s| s.is_enabled()) {
            let (outcome, bundle) = self.run_strategy(strategy, context).await;
            report.outcomes.push(outcome);
            if let Some(bundle) = bundle {
                report.bundles.push(bundle);
            }
        }

        report.latency_us = tick_start.elapsed().as_secs_f64() * 1e6;
        self.metrics.ticks.inc();
        self.metrics.tick_latency.observe(report.latency_us / 1e6);
        report
    }

    async fn run_strategy(
        &self,
        strategy: &Arc<dyn Strategy>,
        context: &StrategyContext,
    ) -> (StrategyOutcome, Option<Bundle>) {
        let name = strategy.name().to_string();
        let core = strategy.core();

        let detect_start = Instant::now();
        let detected = AssertUnwindSafe(strategy.detect_opportunity(context)).catch_unwind().await;
        let detection_latency_us = detect_start.elapsed().as_secs_f64() * 1e6;
        core.record_detection_latency(detection_latency_us).await;

        let mut outcome = StrategyOutcome {
            strategy: name.clone(),
            result: StrategyResult::NoOpportunity,
            opportunity_id: None,
            expected_profit_eth: 0.0,
            gas_cost_eth: 0.0,
            detection_latency_us,
            execution_latency_us: None,
        };

        let opportunity = match detected {
            Ok(Ok(Some(opportunity))) => opportunity,
            Ok(Ok(None)) => return (outcome, None),
            Ok(Err(e)) => {
                error!("❌ {} 전략 탐지 실패: {:#}", name, e);
                core.record_detection_failure().await;
                self.metrics.faults.inc();
                outcome.result = StrategyResult::Error;
                return (outcome, None);
            }
            Err(payload) => {
                error!("💥 {} 전략 탐지 중 패닉: {}", name, panic_message(payload.as_ref()));
                core.record_detection_failure().await;
                self.metrics.faults.inc();
                outcome.result = StrategyResult::Error;
                return (outcome, None);
            }
        };

        core.record_detected().await;
        outcome.opportunity_id = Some(opportunity.id.clone());
        outcome.expected_profit_eth = opportunity.expected_profit_eth;
        outcome.gas_cost_eth = opportunity.estimated_gas_cost_eth;

        let timeout = Duration::from_millis(core.config().await.bundle_timeout_ms);
        let exec_start = Instant::now();
        let executed = tokio::time::timeout(
            timeout,
            AssertUnwindSafe(strategy.execute_opportunity(&opportunity)).catch_unwind(),
        )
        .await;
        let execution_latency_us = exec_start.elapsed().as_secs_f64() * 1e6;
        outcome.execution_latency_us = Some(execution_latency_us);

        let (result, bundle) = match executed {
            Err(_) => {
                warn!("⏰ {} 전략 실행 타임아웃 ({}ms)", name, timeout.as_millis());
                self.metrics.timeouts.inc();
                (StrategyResult::Timeout, None)
            }
            Ok(Err(payload)) => {
                error!("💥 {} 전략 실행 중 패닉: {}", name, panic_message(payload.as_ref()));
                self.metrics.faults.inc();
                (StrategyResult::Error, None)
            }
            Ok(Ok(Err(result))) => {
                if result.is_fault() {
                    warn!("❌ {} 전략 실행 실패: {}", name, result);
                } else {
                    debug!("🚫 {} 전략 실행 거부: {}", name, result);
                }
                (result, None)
            }
            Ok(Ok(Ok(bundle))) => {
                if core.validate_bundle(&bundle).await {
                    (StrategyResult::Success, Some(bundle))
                } else {
                    warn!("❌ {} 전략 번들 검증 실패: {}", name, bundle.id());
                    (StrategyResult::Failed, None)
                }
            }
        };

        if result == StrategyResult::Success {
            core.update_success(opportunity.expected_profit_eth, opportunity.estimated_gas_cost_eth, execution_latency_us)
                .await;
            self.metrics.bundles.inc();
            debug!(
                "✅ {} 번들 생성: 블록 {}, 순이익 {:.6} ETH",
                name,
                opportunity.block_number + 1,
                opportunity.net_profit_eth
            );
        } else {
            core.update_failure(execution_latency_us).await;
        }

        outcome.result = result;
        (outcome, bundle)
    }
}

impl std::fmt::Debug for StrategyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyEngine")
            .field("strategies", &self.strategy_names())
            .field("enabled", &self.enabled_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::mocks::{MockBehavior, MockStrategy};
    use crate::monitoring::MetricsRegistry;
    use crate::types::MarketSnapshot;
    use tokio_util::sync::CancellationToken;

    fn context(block: u64) -> StrategyContext {
        let snapshot = MarketSnapshot {
            block_number: block,
            gas_price_gwei: 20.0,
            mempool_transactions: vec!["0xabc".to_string()],
            ..Default::default()
        };
        StrategyContext::from_snapshot(snapshot, CancellationToken::new())
    }

    fn mock(registry: &MetricsRegistry, name: &str, behavior: MockBehavior) -> Arc<MockStrategy> {
        Arc::new(MockStrategy::new(name, behavior, registry))
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let registry = MetricsRegistry::new();
        let mut engine = StrategyEngine::new(&registry);
        engine.register(mock(&registry, "a", MockBehavior::Idle)).unwrap();
        let err = engine.register(mock(&registry, "a", MockBehavior::Idle)).unwrap_err();
        assert!(matches!(err, SimulatorError::DuplicateStrategy(name) if name == "a"));
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn test_from_config_registers_known_and_rejects_unknown() {
        let registry = MetricsRegistry::new();
        let engine = StrategyEngine::from_config(&Config::default(), &registry).unwrap();
        assert_eq!(engine.strategy_names(), vec!["arbitrage".to_string()]);

        let mut config = Config::default();
        config.strategies.insert("sandwich".to_string(), StrategyConfig::default());
        assert!(matches!(
            StrategyEngine::from_config(&config, &registry),
            Err(SimulatorError::UnknownStrategy(_))
        ));

        config.strategies.get_mut("sandwich").unwrap().enabled = false;
        assert_eq!(StrategyEngine::from_config(&config, &registry).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tick_runs_in_registration_order_and_collects_bundles() {
        let registry = MetricsRegistry::new();
        let mut engine = StrategyEngine::new(&registry);
        engine.register(mock(&registry, "first", MockBehavior::Profitable { net_profit_eth: 0.05 })).unwrap();
        engine.register(mock(&registry, "second", MockBehavior::Idle)).unwrap();
        engine.register(mock(&registry, "third", MockBehavior::Profitable { net_profit_eth: 0.02 })).unwrap();

        let report = engine.run_tick(&context(10)).await;
        let order: Vec<&str> = report.outcomes.iter().map(|o| o.strategy.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
        assert_eq!(report.bundles.len(), 2);
        assert_eq!(report.successful(), 2);
        assert_eq!(report.opportunities_detected(), 2);
        assert_eq!(report.outcome("second").unwrap().result, StrategyResult::NoOpportunity);
        assert!(report.bundles.iter().all(|b| b.target_block() == 11));

        let stats = engine.strategy("first").unwrap().stats().await;
        assert_eq!(stats.opportunities_detected, 1);
        assert_eq!(stats.successful_executions, 1);
        assert_eq!(stats.detection_samples, 1);
    }

    #[tokio::test]
    async fn test_faults_are_isolated() {
        let registry = MetricsRegistry::new();
        let mut engine = StrategyEngine::new(&registry);
        engine.register(mock(&registry, "detect_err", MockBehavior::DetectError)).unwrap();
        engine.register(mock(&registry, "detect_panic", MockBehavior::DetectPanic)).unwrap();
        engine.register(mock(&registry, "exec_panic", MockBehavior::ExecutePanic)).unwrap();
        engine.register(mock(&registry, "healthy", MockBehavior::Profitable { net_profit_eth: 0.05 })).unwrap();

        let report = engine.run_tick(&context(1)).await;
        assert_eq!(report.strategies_run(), 4);
        assert_eq!(report.outcome("detect_err").unwrap().result, StrategyResult::Error);
        assert_eq!(report.outcome("detect_panic").unwrap().result, StrategyResult::Error);
        assert_eq!(report.outcome("exec_panic").unwrap().result, StrategyResult::Error);
        assert_eq!(report.outcome("healthy").unwrap().result, StrategyResult::Success);
        assert_eq!(report.bundles.len(), 1);

        let detect_panic = engine.strategy("detect_panic").unwrap().stats().await;
        assert_eq!(detect_panic.detection_failures, 1);
        assert_eq!(detect_panic.opportunities_executed, 0);

        let exec_panic = engine.strategy("exec_panic").unwrap().stats().await;
        assert_eq!(exec_panic.failed_executions, 1);
        assert_eq!(registry.snapshot().counters["engine_strategy_faults_total"], 3);
    }

    #[tokio::test]
    async fn test_slow_execution_times_out() {
        let registry = MetricsRegistry::new();
        let config = StrategyConfig { bundle_timeout_ms: 20, ..Default::default() };
        let slow = Arc::new(MockStrategy::with_config(
            "slow",
            MockBehavior::SlowExecute { delay_ms: 500 },
            config,
            &registry,
        ));
        let mut engine = StrategyEngine::new(&registry);
        engine.register(slow.clone()).unwrap();

        let report = engine.run_tick(&context(1)).await;
        let outcome = report.outcome("slow").unwrap();
        assert_eq!(outcome.result, StrategyResult::Timeout);
        assert!(outcome.execution_latency_us.unwrap() < 400_000.0);
        assert!(report.bundles.is_empty());

        let stats = slow.stats().await;
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.opportunities_detected, 1);
    }

    #[tokio::test]
    async fn test_rejections_and_invalid_bundles_count_as_failures() {
        let registry = MetricsRegistry::new();
        let mut engine = StrategyEngine::new(&registry);
        engine.register(mock(&registry, "reject", MockBehavior::Reject(StrategyResult::HighSlippage))).unwrap();
        engine.register(mock(&registry, "empty", MockBehavior::EmptyBundle)).unwrap();
        engine.register(mock(&registry, "poor", MockBehavior::Profitable { net_profit_eth: 0.001 })).unwrap();

        let report = engine.run_tick(&context(1)).await;
        assert_eq!(report.outcome("reject").unwrap().result, StrategyResult::HighSlippage);
        assert_eq!(report.outcome("empty").unwrap().result, StrategyResult::Failed);
        assert_eq!(report.outcome("poor").unwrap().result, StrategyResult::InsufficientProfit);

        for (_, stats) in engine.stats_snapshot().await {
            assert_eq!(stats.opportunities_executed, 1);
            assert_eq!(stats.failed_executions, 1);
        }
    }

    #[tokio::test]
    async fn test_disabled_strategy_is_skipped_but_kept() {
        let registry = MetricsRegistry::new();
        let mut engine = StrategyEngine::new(&registry);
        let strategy = mock(&registry, "toggle", MockBehavior::Profitable { net_profit_eth: 0.05 });
        engine.register(strategy.clone()).unwrap();
        engine.run_tick(&context(1)).await;

        engine.set_strategy_enabled("toggle", false).unwrap();
        let report = engine.run_tick(&context(2)).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(strategy.detect_calls(), 1);

        engine.set_strategy_enabled("toggle", true).unwrap();
        engine.run_tick(&context(3)).await;
        assert_eq!(strategy.stats().await.successful_executions, 2);

        assert!(matches!(
            engine.set_strategy_enabled("missing", true),
            Err(SimulatorError::UnknownStrategy(_))
        ));
    }

    #[tokio::test]
    async fn test_initialize_all_reports_failing_strategy() {
        let registry = MetricsRegistry::new();
        let mut engine = StrategyEngine::new(&registry);
        engine.register(mock(&registry, "ok", MockBehavior::Idle)).unwrap();
        engine
            .register(Arc::new(MockStrategy::new("broken", MockBehavior::Idle, &registry).failing_initialize()))
            .unwrap();

        match engine.initialize_all().await {
            Err(SimulatorError::StrategyInit { name, .. }) => assert_eq!(name, "broken"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(engine.strategy("ok").map(|s| s.name().to_string()), Some("ok".to_string()));
    }

    #[tokio::test]
    async fn test_reset_all_clears_stats() {
        let registry = MetricsRegistry::new();
        let mut engine = StrategyEngine::new(&registry);
        engine.register(mock(&registry, "a", MockBehavior::Profitable { net_profit_eth: 0.05 })).unwrap();
        engine.run_tick(&context(1)).await;

        engine.reset_all().await;
        let snapshot = engine.stats_snapshot().await;
        assert_eq!(snapshot[0].1, StrategyStats::default());
    }
}
