use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::StrategyConfig;
use crate::constants::*;
use crate::core::bundle::Bundle;
use crate::monitoring::{Counter, Gauge, Histogram, MetricsSink, DEFAULT_BUCKETS};
use crate::strategies::stats::StrategyStats;
use crate::types::{Opportunity, StrategyResult};

/// 전략별 메트릭 핸들
#[derive(Debug, Clone)]
pub struct StrategyMetrics {
    pub detected: Counter,
    pub executed: Counter,
    pub successful: Counter,
    pub failed: Counter,
    pub total_profit: Gauge,
    /// seconds
    pub detection_latency: Histogram,
    /// seconds
    pub execution_latency: Histogram,
}

impl StrategyMetrics {
    pub fn new(name: &str, sink: &dyn MetricsSink) -> Self {
        Self {
            detected: sink.counter(
                &format!("strategy_{}_opportunities_detected_total", name),
                "Opportunities detected",
            ),
            executed: sink.counter(
                &format!("strategy_{}_executions_total", name),
                "Execution attempts",
            ),
            successful: sink.counter(
                &format!("strategy_{}_successful_executions_total", name),
                "Successful executions",
            ),
            failed: sink.counter(
                &format!("strategy_{}_failed_executions_total", name),
                "Failed executions",
            ),
            total_profit: sink.gauge(
                &format!("strategy_{}_profit_eth", name),
                "Accumulated expected profit in ETH",
            ),
            detection_latency: sink.histogram(
                &format!("strategy_{}_detection_latency_seconds", name),
                "Detection latency",
                &DEFAULT_BUCKETS,
            ),
            execution_latency: sink.histogram(
                &format!("strategy_{}_execution_latency_seconds", name),
                "Execution latency",
                &DEFAULT_BUCKETS,
            ),
        }
    }
}

/// 모든 전략이 공유하는 상태와 검증 헬퍼
pub struct StrategyCore {
    name: String,
    config: RwLock<StrategyConfig>,
    enabled: AtomicBool,
    stats: RwLock<StrategyStats>,
    metrics: StrategyMetrics,
    max_bundle_transactions: usize,
}

impl StrategyCore {
    pub fn new(name: impl Into<String>, config: StrategyConfig, sink: &dyn MetricsSink) -> Self {
        let name = name.into();
        let metrics = StrategyMetrics::new(&name, sink);
        Self {
            enabled: AtomicBool::new(config.enabled),
            name,
            config: RwLock::new(config),
            stats: RwLock::new(StrategyStats::default()),
            metrics,
            max_bundle_transactions: MAX_BUNDLE_TRANSACTIONS,
        }
    }

    pub fn with_max_bundle_transactions(mut self, max: usize) -> Self {
        self.max_bundle_transactions = max;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &StrategyMetrics {
        &self.metrics
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub async fn config(&self) -> StrategyConfig {
        self.config.read().await.clone()
    }

    pub async fn update_config(&self, config: StrategyConfig) {
        self.set_enabled(config.enabled);
        *self.config.write().await = config;
        info!("🔧 전략 설정 갱신: {}", self.name);
    }

    pub async fn stats(&self) -> StrategyStats {
        self.stats.read().await.clone()
    }

    pub async fn reset_stats(&self) {
        self.stats.write().await.reset();
        debug!("🔄 {} 통계 초기화", self.name);
    }

    // ===== 통계 갱신 =====

    pub async fn record_detected(&self) {
        self.stats.write().await.record_detected();
        self.metrics.detected.inc();
    }

    pub async fn record_detection_failure(&self) {
        self.stats.write().await.record_detection_failure();
    }

    pub async fn record_detection_latency(&self, latency_us: f64) {
        self.stats.write().await.record_detection_latency(latency_us);
        self.metrics.detection_latency.observe(latency_us / 1e6);
    }

    pub async fn update_success(&self, profit_eth: f64, gas_cost_eth: f64, latency_us: f64) {
        self.stats.write().await.update_success(profit_eth, gas_cost_eth, latency_us);
        self.metrics.executed.inc();
        self.metrics.successful.inc();
        self.metrics.total_profit.add(profit_eth);
        self.metrics.execution_latency.observe(latency_us / 1e6);
    }

    pub async fn update_failure(&self, latency_us: f64) {
        self.stats.write().await.update_failure(latency_us);
        self.metrics.executed.inc();
        self.metrics.failed.inc();
        self.metrics.execution_latency.observe(latency_us / 1e6);
    }

    // ===== 검증 =====

    pub async fn is_profitable(&self, opportunity: &Opportunity) -> bool {
        opportunity.net_profit_eth >= self.config.read().await.min_profit_eth
    }

    pub async fn is_slippage_acceptable(&self, slippage_percent: f64) -> bool {
        slippage_percent <= self.config.read().await.max_slippage_percent
    }

    pub async fn is_gas_price_acceptable(&self, gas_price_gwei: f64) -> bool {
        gas_price_gwei <= self.config.read().await.max_gas_price_gwei
    }

    /// 첫 번째로 실패한 검증 결과, 모두 통과하면 `Success`
    pub async fn validate_opportunity(&self, opportunity: &Opportunity) -> StrategyResult {
        if !self.is_profitable(opportunity).await {
            return StrategyResult::InsufficientProfit;
        }
        if !self.is_slippage_acceptable(opportunity.slippage_percent).await {
            return StrategyResult::HighSlippage;
        }
        if !self.is_gas_price_acceptable(opportunity.gas_price_gwei).await {
            return StrategyResult::GasTooHigh;
        }
        StrategyResult::Success
    }

    pub async fn validate_bundle(&self, bundle: &Bundle) -> bool {
        if bundle.is_empty() || bundle.len() > self.max_bundle_transactions {
            return false;
        }
        bundle.total_gas_limit() <= self.config.read().await.gas_limit
    }

    // ===== 유틸리티 =====

    pub fn calculate_net_profit(opportunity: &Opportunity) -> f64 {
        opportunity.expected_profit_eth - opportunity.estimated_gas_cost_eth
    }

    pub fn estimate_gas_cost(gas_limit: u64, gas_price_gwei: f64) -> f64 {
        gas_limit as f64 * gas_price_gwei * GWEI_TO_ETH
    }

    /// |expected - actual| / expected (%). expected 가 0 이면 0
    pub fn calculate_slippage(expected_price: f64, actual_price: f64) -> f64 {
        if expected_price == 0.0 {
            return 0.0;
        }
        ((expected_price - actual_price) / expected_price).abs() * 100.0
    }
}

impl std::fmt::Debug for StrategyCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyCore")
            .field("name", &self.name)
            .field("enabled", &self.is_enabled())
            .field("max_bundle_transactions", &self.max_bundle_transactions)
            .finish()
    }
}
