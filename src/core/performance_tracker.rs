use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::monitoring::{Counter, Gauge, MetricsSink};
use crate::strategies::{StrategyStats, TickReport};

/// 시뮬레이션 전체 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimulationStats {
    pub blocks_processed: u64,
    pub transactions_processed: u64,
    pub strategies_executed: u64,
    pub opportunities_detected: u64,
    pub profitable_opportunities: u64,
    pub bundles_submitted: u64,
    pub total_profit_eth: f64,
    pub total_gas_cost_eth: f64,

    pub avg_detection_latency_us: f64,
    pub avg_execution_latency_us: f64,
    pub avg_tick_latency_us: f64,
    /// 실행 지연 평균의 표본 수
    pub execution_samples: u64,

    pub tx_throughput: f64,
    pub strategy_throughput: f64,
    pub opportunity_throughput: f64,
    pub elapsed_seconds: f64,

    pub start_time: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
}

impl SimulationStats {
    pub fn net_profit_eth(&self) -> f64 {
        self.total_profit_eth - self.total_gas_cost_eth
    }

    /// 한 틱의 결과를 누적
    pub fn record_tick(&mut self, report: &TickReport, transactions: usize) {
        let strategies = report.strategies_run() as u64;
        let executions: Vec<f64> = report.outcomes.iter().filter_map(|o| o.execution_latency_us).collect();

        self.blocks_processed += 1;
        self.transactions_processed += transactions as u64;

        if strategies > 0 {
            let prev = self.strategies_executed as f64;
            self.avg_detection_latency_us = (self.avg_detection_latency_us * prev
                + report.avg_detection_latency_us() * strategies as f64)
                / (prev + strategies as f64);
        }
        self.strategies_executed += strategies;

        if !executions.is_empty() {
            let prev = self.execution_samples as f64;
            let sum: f64 = executions.iter().sum();
            self.avg_execution_latency_us = (self.avg_execution_latency_us * prev + sum) / (prev + executions.len() as f64);
            self.execution_samples += executions.len() as u64;
        }

        self.avg_tick_latency_us = (self.avg_tick_latency_us * (self.blocks_processed - 1) as f64 + report.latency_us)
            / self.blocks_processed as f64;

        self.opportunities_detected += report.opportunities_detected() as u64;
        self.profitable_opportunities += report.successful() as u64;
        self.total_profit_eth += report.total_profit_eth();
        self.total_gas_cost_eth += report.total_gas_cost_eth();
        self.last_update = Some(Utc::now());
    }

    /// 경과 시간 기준 처리량 갱신
    pub fn refresh_throughput(&mut self, elapsed_seconds: f64) {
        self.elapsed_seconds = elapsed_seconds;
        if elapsed_seconds > 0.0 {
            self.tx_throughput = self.transactions_processed as f64 / elapsed_seconds;
            self.strategy_throughput = self.strategies_executed as f64 / elapsed_seconds;
            self.opportunity_throughput = self.opportunities_detected as f64 / elapsed_seconds;
        }
        self.last_update = Some(Utc::now());
    }

    /// `metric,value` 요약 뒤에 빈 줄과 전략별 표를 붙인 CSV
    pub fn to_csv(&self, strategies: &[(String, StrategyStats)]) -> String {
        let mut csv_output = String::from("metric,value\n");
        let summary: [(&str, String); 17] = [
            ("blocks_processed", self.blocks_processed.to_string()),
            ("transactions_processed", self.transactions_processed.to_string()),
            ("strategies_executed", self.strategies_executed.to_string()),
            ("opportunities_detected", self.opportunities_detected.to_string()),
            ("profitable_opportunities", self.profitable_opportunities.to_string()),
            ("bundles_submitted", self.bundles_submitted.to_string()),
            ("total_profit_eth", self.total_profit_eth.to_string()),
            ("total_gas_cost_eth", self.total_gas_cost_eth.to_string()),
            ("net_profit_eth", self.net_profit_eth().to_string()),
            ("avg_detection_latency_us", self.avg_detection_latency_us.to_string()),
            ("avg_execution_latency_us", self.avg_execution_latency_us.to_string()),
            ("avg_tick_latency_us", self.avg_tick_latency_us.to_string()),
            ("tx_throughput", self.tx_throughput.to_string()),
            ("strategy_throughput", self.strategy_throughput.to_string()),
            ("opportunity_throughput", self.opportunity_throughput.to_string()),
            ("elapsed_seconds", self.elapsed_seconds.to_string()),
            (
                "start_time",
                self.start_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
            ),
        ];
        for (metric, value) in summary {
            csv_output.push_str(&format!("{},{}\n", metric, value));
        }

        csv_output.push_str(
            "\nstrategy,opportunities_detected,opportunities_executed,successful_executions,failed_executions,\
             detection_failures,total_profit_eth,total_gas_used_eth,success_rate,avg_detection_latency_us,\
             avg_execution_latency_us\n",
        );
        for (name, stats) in strategies {
            csv_output.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{}\n",
                name,
                stats.opportunities_detected,
                stats.opportunities_executed,
                stats.successful_executions,
                stats.failed_executions,
                stats.detection_failures,
                stats.total_profit_eth,
                stats.total_gas_used_eth,
                stats.success_rate,
                stats.avg_detection_latency_us,
                stats.avg_execution_latency_us
            ));
        }
        csv_output
    }
}

#[derive(Debug, Clone)]
struct PipelineMetrics {
    blocks: Counter,
    transactions: Counter,
    bundles: Counter,
    profit: Gauge,
    tx_throughput: Gauge,
    opportunity_throughput: Gauge,
}

impl PipelineMetrics {
    fn new(sink: &dyn MetricsSink) -> Self {
        Self {
            blocks: sink.counter("simulation_blocks_processed_total", "Blocks processed by the pipeline"),
            transactions: sink.counter("simulation_transactions_processed_total", "Mempool transactions seen"),
            bundles: sink.counter("simulation_bundles_submitted_total", "Bundles handed to the submission sink"),
            profit: sink.gauge("simulation_total_profit_eth", "Cumulative expected profit of executed bundles"),
            tx_throughput: sink.gauge("simulation_tx_throughput", "Transactions processed per second"),
            opportunity_throughput: sink.gauge("simulation_opportunity_throughput", "Opportunities detected per second"),
        }
    }
}

/// 통계 집계기
///
/// 틱 태스크가 기록하고 통계 태스크가 처리량과 게이지를 갱신합니다.
pub struct PerformanceTracker {
    stats: RwLock<SimulationStats>,
    started: RwLock<Option<Instant>>,
    latency_target_us: f64,
    metrics: PipelineMetrics,
}

impl PerformanceTracker {
    pub fn new(latency_target_ms: u64, sink: &dyn MetricsSink) -> Self {
        Self {
            stats: RwLock::new(SimulationStats::default()),
            started: RwLock::new(None),
            latency_target_us: latency_target_ms as f64 * 1_000.0,
            metrics: PipelineMetrics::new(sink),
        }
    }

    /// 실행 시작 시각 기록
    pub async fn start(&self) {
        *self.started.write().await = Some(Instant::now());
        self.stats.write().await.start_time = Some(Utc::now());
    }

    pub async fn elapsed_seconds(&self) -> f64 {
        self.started
            .read()
            .await
            .map(|started| started.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    pub async fn record_tick(&self, report: &TickReport, transactions: usize) {
        if report.latency_us > self.latency_target_us {
            warn!(
                "🐢 블록 {} 틱 지연 {:.1}ms 가 목표 {:.1}ms 초과",
                report.block_number,
                report.latency_us / 1_000.0,
                self.latency_target_us / 1_000.0
            );
        }

        let mut stats = self.stats.write().await;
        stats.record_tick(report, transactions);
        self.metrics.blocks.inc();
        self.metrics.transactions.inc_by(transactions as u64);
        self.metrics.profit.set(stats.total_profit_eth);
    }

    pub async fn record_bundle_submitted(&self) {
        self.stats.write().await.bundles_submitted += 1;
        self.metrics.bundles.inc();
    }

    /// 처리량 계산 후 게이지 갱신, 갱신된 스냅샷 반환
    pub async fn refresh(&self) -> SimulationStats {
        let elapsed = self.elapsed_seconds().await;
        let mut stats = self.stats.write().await;
        stats.refresh_throughput(elapsed);
        self.metrics.tx_throughput.set(stats.tx_throughput);
        self.metrics.opportunity_throughput.set(stats.opportunity_throughput);
        stats.clone()
    }

    pub async fn snapshot(&self) -> SimulationStats {
        self.stats.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.stats.write().await = SimulationStats::default();
        *self.started.write().await = None;
    }

    pub async fn print_summary(&self) {
        let stats = self.snapshot().await;
        info!("📊 시뮬레이션 요약");
        info!("  🧱 처리 블록: {}", stats.blocks_processed);
        info!("  📨 처리 트랜잭션: {}", stats.transactions_processed);
        info!("  🎯 전략 실행: {}", stats.strategies_executed);
        info!("  💡 탐지 기회: {} (수익성 {})", stats.opportunities_detected, stats.profitable_opportunities);
        info!("  📦 제출 번들: {}", stats.bundles_submitted);
        info!(
            "  💰 총 수익: {:.6} ETH (가스 {:.6} ETH, 순수익 {:.6} ETH)",
            stats.total_profit_eth,
            stats.total_gas_cost_eth,
            stats.net_profit_eth()
        );
        info!(
            "  ⏱️ 평균 지연: 탐지 {:.1}μs, 실행 {:.1}μs, 틱 {:.1}μs",
            stats.avg_detection_latency_us, stats.avg_execution_latency_us, stats.avg_tick_latency_us
        );
        info!(
            "  🚀 처리량: {:.1} tx/s, {:.1} 전략/s, {:.2} 기회/s",
            stats.tx_throughput, stats.strategy_throughput, stats.opportunity_throughput
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::MetricsRegistry;
    use crate::strategies::StrategyOutcome;
    use crate::types::StrategyResult;

    fn outcome(result: StrategyResult, detection_us: f64, execution_us: Option<f64>) -> StrategyOutcome {
        StrategyOutcome {
            strategy: "mock".into(),
            result,
            opportunity_id: execution_us.map(|_| "opp".to_string()),
            expected_profit_eth: 0.2,
            gas_cost_eth: 0.01,
            detection_latency_us: detection_us,
            execution_latency_us: execution_us,
        }
    }

    fn report(outcomes: Vec<StrategyOutcome>, latency_us: f64) -> TickReport {
        TickReport { block_number: 1, outcomes, bundles: Vec::new(), latency_us }
    }

    #[test]
    fn test_csv_export_layout() {
        let stats = SimulationStats {
            blocks_processed: 3,
            bundles_submitted: 2,
            total_profit_eth: 0.5,
            total_gas_cost_eth: 0.125,
            ..Default::default()
        };
        let arbitrage = StrategyStats {
            opportunities_detected: 4,
            opportunities_executed: 2,
            successful_executions: 1,
            failed_executions: 1,
            success_rate: 0.5,
            ..Default::default()
        };
        let csv = stats.to_csv(&[("arbitrage".to_string(), arbitrage)]);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "metric,value");
        assert_eq!(lines[1], "blocks_processed,3");
        assert!(lines.contains(&"bundles_submitted,2"));
        assert!(lines.contains(&"net_profit_eth,0.375"));
        assert!(lines.contains(&"start_time,"));

        let header = lines.iter().position(|l| l.starts_with("strategy,")).unwrap();
        assert_eq!(lines[header - 1], "");
        let columns = lines[header].split(',').count();
        assert_eq!(columns, 11);
        assert_eq!(lines[header + 1], "arbitrage,4,2,1,1,0,0,0,0.5,0,0");
        assert_eq!(lines[header + 1].split(',').count(), columns);
        assert_eq!(lines.len(), header + 2);
    }

    #[test]
    fn test_running_averages() {
        let mut stats = SimulationStats::default();
        stats.record_tick(
            &report(
                vec![
                    outcome(StrategyResult::Success, 10.0, Some(100.0)),
                    outcome(StrategyResult::NoOpportunity, 30.0, None),
                ],
                200.0,
            ),
            5,
        );
        stats.record_tick(&report(vec![outcome(StrategyResult::HighSlippage, 50.0, Some(300.0))], 400.0), 7);

        assert_eq!(stats.blocks_processed, 2);
        assert_eq!(stats.transactions_processed, 12);
        assert_eq!(stats.strategies_executed, 3);
        assert_eq!(stats.opportunities_detected, 2);
        assert_eq!(stats.profitable_opportunities, 1);
        assert!((stats.avg_detection_latency_us - 30.0).abs() < 1e-9);
        assert!((stats.avg_execution_latency_us - 200.0).abs() < 1e-9);
        assert!((stats.avg_tick_latency_us - 300.0).abs() < 1e-9);
        assert!((stats.total_profit_eth - 0.2).abs() < 1e-12);
        assert!((stats.net_profit_eth() - 0.19).abs() < 1e-12);
    }

    #[test]
    fn test_throughput() {
        let mut stats = SimulationStats { transactions_processed: 100, opportunities_detected: 4, ..Default::default() };
        stats.refresh_throughput(2.0);
        assert_eq!(stats.tx_throughput, 50.0);
        assert_eq!(stats.opportunity_throughput, 2.0);

        let mut idle = SimulationStats::default();
        idle.refresh_throughput(0.0);
        assert_eq!(idle.tx_throughput, 0.0);
    }

    #[tokio::test]
    async fn test_tracker_updates_metrics() {
        let registry = MetricsRegistry::new();
        let tracker = PerformanceTracker::new(50, &registry);
        tracker.start().await;
        tracker.record_tick(&report(vec![outcome(StrategyResult::Success, 1.0, Some(2.0))], 10.0), 3).await;
        tracker.record_bundle_submitted().await;

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.counters["simulation_blocks_processed_total"], 1);
        assert_eq!(snapshot.counters["simulation_transactions_processed_total"], 3);
        assert_eq!(snapshot.counters["simulation_bundles_submitted_total"], 1);
        assert!(tracker.snapshot().await.start_time.is_some());

        tracker.reset().await;
        assert_eq!(tracker.snapshot().await, SimulationStats::default());
    }
}
