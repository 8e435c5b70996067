use serde::{Deserialize, Serialize};
use tracing::info;

/// 전략별 실행 통계
///
/// 모든 평균은 `avg' = avg + (x - avg) / n` 으로 갱신되는 누적 평균입니다.
/// 최소값 필드는 `f64::MAX` 로 시작하며 첫 샘플에서 덮어씌워집니다.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyStats {
    pub opportunities_detected: u64,
    pub opportunities_executed: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    /// 탐지 단계의 에러/패닉 (실행 시도에는 포함되지 않음)
    pub detection_failures: u64,

    pub total_profit_eth: f64,
    pub total_gas_used_eth: f64,
    pub success_rate: f64,

    pub detection_samples: u64,
    pub avg_detection_latency_us: f64,
    pub avg_execution_latency_us: f64,
    pub min_execution_latency_us: f64,
    pub max_execution_latency_us: f64,

    pub min_profit_eth: f64,
    pub max_profit_eth: f64,
    pub avg_profit_eth: f64,
}

impl Default for StrategyStats {
    fn default() -> Self {
        Self {
            opportunities_detected: 0,
            opportunities_executed: 0,
            successful_executions: 0,
            failed_executions: 0,
            detection_failures: 0,
            total_profit_eth: 0.0,
            total_gas_used_eth: 0.0,
            success_rate: 0.0,
            detection_samples: 0,
            avg_detection_latency_us: 0.0,
            avg_execution_latency_us: 0.0,
            min_execution_latency_us: f64::MAX,
            max_execution_latency_us: 0.0,
            min_profit_eth: f64::MAX,
            max_profit_eth: 0.0,
            avg_profit_eth: 0.0,
        }
    }
}

impl StrategyStats {
    pub fn record_detected(&mut self) {
        self.opportunities_detected += 1;
    }

    pub fn record_detection_failure(&mut self) {
        self.detection_failures += 1;
    }

    pub fn record_detection_latency(&mut self, latency_us: f64) {
        self.detection_samples += 1;
        self.avg_detection_latency_us +=
            (latency_us - self.avg_detection_latency_us) / self.detection_samples as f64;
    }

    pub fn update_success(&mut self, profit_eth: f64, gas_cost_eth: f64, latency_us: f64) {
        self.opportunities_executed += 1;
        self.successful_executions += 1;
        self.total_profit_eth += profit_eth;
        self.total_gas_used_eth += gas_cost_eth;

        let n = self.successful_executions as f64;
        self.avg_profit_eth += (profit_eth - self.avg_profit_eth) / n;
        self.min_profit_eth = self.min_profit_eth.min(profit_eth);
        self.max_profit_eth = if self.successful_executions == 1 {
            profit_eth
        } else {
            self.max_profit_eth.max(profit_eth)
        };

        self.record_execution_latency(latency_us);
    }

    pub fn update_failure(&mut self, latency_us: f64) {
        self.opportunities_executed += 1;
        self.failed_executions += 1;
        self.record_execution_latency(latency_us);
    }

    fn record_execution_latency(&mut self, latency_us: f64) {
        let n = self.opportunities_executed as f64;
        self.avg_execution_latency_us += (latency_us - self.avg_execution_latency_us) / n;
        self.min_execution_latency_us = self.min_execution_latency_us.min(latency_us);
        self.max_execution_latency_us = self.max_execution_latency_us.max(latency_us);
        self.success_rate = self.successful_executions as f64 / n;
    }

    pub fn net_profit_eth(&self) -> f64 {
        self.total_profit_eth - self.total_gas_used_eth
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn print_stats(&self, name: &str) {
        info!("📊 ===== {} 전략 통계 =====", name);
        info!("🔍 기회 탐지: {}", self.opportunities_detected);
        info!("⚙️ 실행 시도: {}", self.opportunities_executed);
        info!("✅ 성공: {}", self.successful_executions);
        info!("❌ 실패: {}", self.failed_executions);
        info!("💥 탐지 오류: {}", self.detection_failures);
        info!("💰 총 수익: {:.6} ETH", self.total_profit_eth);
        info!("⛽ 총 가스 비용: {:.6} ETH", self.total_gas_used_eth);
        info!("📈 성공률: {:.2}%", self.success_rate * 100.0);
        info!("⏱️ 평균 탐지 지연: {:.1}μs", self.avg_detection_latency_us);
        info!("⏱️ 평균 실행 지연: {:.1}μs", self.avg_execution_latency_us);
        info!("=====================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_success_running_stats() {
        let mut stats = StrategyStats::default();
        for x in [1.0, 2.0, 3.0] {
            stats.update_success(x, 0.0, x);
        }

        assert_eq!(stats.successful_executions, 3);
        assert_eq!(stats.opportunities_executed, 3);
        assert!((stats.avg_profit_eth - 2.0).abs() < 1e-12);
        assert_eq!(stats.min_profit_eth, 1.0);
        assert_eq!(stats.max_profit_eth, 3.0);
        assert!((stats.avg_execution_latency_us - 2.0).abs() < 1e-12);
        assert_eq!(stats.min_execution_latency_us, 1.0);
        assert_eq!(stats.max_execution_latency_us, 3.0);
        assert_eq!(stats.success_rate, 1.0);
    }

    #[test]
    fn test_failure_counts_attempt() {
        let mut stats = StrategyStats::default();
        stats.update_success(0.5, 0.1, 100.0);
        stats.update_failure(300.0);

        assert_eq!(stats.opportunities_executed, 2);
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.success_rate, 0.5);
        assert!((stats.avg_execution_latency_us - 200.0).abs() < 1e-12);
        assert!((stats.net_profit_eth() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_negative_profit_updates_max() {
        let mut stats = StrategyStats::default();
        stats.update_success(-0.2, 0.0, 1.0);
        assert_eq!(stats.max_profit_eth, -0.2);
        assert_eq!(stats.min_profit_eth, -0.2);
    }

    #[test]
    fn test_detection_latency_mean() {
        let mut stats = StrategyStats::default();
        stats.record_detection_latency(10.0);
        stats.record_detection_latency(30.0);
        assert!((stats.avg_detection_latency_us - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut stats = StrategyStats::default();
        stats.update_success(1.0, 0.1, 5.0);
        stats.record_detected();

        stats.reset();
        let once = stats.clone();
        stats.reset();
        assert_eq!(stats, once);
        assert_eq!(once, StrategyStats::default());
    }
}
