use async_trait::async_trait;
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::StrategyConfig;
use crate::core::bundle::{Bundle, BundleBuilder};
use crate::dex::{DexKind, LiquidityPool};
use crate::monitoring::MetricsSink;
use crate::strategies::base::StrategyCore;
use crate::strategies::traits::Strategy;
use crate::types::*;

/// Mock 전략 동작
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// 항상 기회 없음
    Idle,
    /// 기회를 탐지하고 정상 번들 생성
    Profitable { net_profit_eth: f64 },
    DetectError,
    DetectPanic,
    /// 탐지 후 실행에서 지정 시간만큼 대기
    SlowExecute { delay_ms: u64 },
    ExecutePanic,
    Reject(StrategyResult),
    /// 트랜잭션 없는 번들 반환 (번들 검증 실패)
    EmptyBundle,
    /// 탐지 단계에서 지정 시간만큼 대기
    SlowDetect { delay_ms: u64 },
}

/// 엔진/파이프라인 테스트용 전략
pub struct MockStrategy {
    core: StrategyCore,
    behavior: MockBehavior,
    detect_calls: AtomicU64,
    execute_calls: AtomicU64,
    initialize_calls: AtomicU64,
    fail_initialize: bool,
}

impl MockStrategy {
    pub fn new(name: &str, behavior: MockBehavior, sink: &dyn MetricsSink) -> Self {
        Self::with_config(name, behavior, StrategyConfig::default(), sink)
    }

    pub fn with_config(name: &str, behavior: MockBehavior, config: StrategyConfig, sink: &dyn MetricsSink) -> Self {
        Self {
            core: StrategyCore::new(name, config, sink),
            behavior,
            detect_calls: AtomicU64::new(0),
            execute_calls: AtomicU64::new(0),
            initialize_calls: AtomicU64::new(0),
            fail_initialize: false,
        }
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn detect_calls(&self) -> u64 {
        self.detect_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> u64 {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn initialize_calls(&self) -> u64 {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    fn mock_pool() -> Option<LiquidityPool> {
        LiquidityPool::new("0xmock", "WETH", "USDC", DexKind::UniswapV2, 100.0, 250_000.0, 0.3).ok()
    }
}

#[async_trait]
impl Strategy for MockStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    async fn initialize(&self) -> Result<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize {
            return Err(anyhow!("mock initialize failure"));
        }
        Ok(())
    }

    async fn detect_opportunity(&self, context: &StrategyContext) -> Result<Option<Opportunity>> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        let net_profit = match &self.behavior {
            MockBehavior::Idle => return Ok(None),
            MockBehavior::DetectError => return Err(anyhow!("mock detection failure")),
            MockBehavior::DetectPanic => panic!("mock detection panic"),
            MockBehavior::SlowDetect { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                return Ok(None);
            }
            MockBehavior::Profitable { net_profit_eth } => *net_profit_eth,
            _ => 0.1,
        };

        let opportunity = Opportunity::new(
            self.name(),
            context.block_number,
            OpportunityDetails::Generic { description: format!("{:?}", self.behavior) },
        )
        .with_profit(net_profit + 0.001, 0.001)
        .with_gas(110_000, context.gas_price_gwei)
        .with_targets(context.mempool_transactions.iter().take(1).cloned().collect());
        Ok(Some(opportunity))
    }

    async fn execute_opportunity(&self, opportunity: &Opportunity) -> std::result::Result<Bundle, StrategyResult> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::SlowExecute { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
            }
            MockBehavior::ExecutePanic => panic!("mock execution panic"),
            MockBehavior::Reject(result) => return Err(*result),
            MockBehavior::EmptyBundle => return Ok(BundleBuilder::for_opportunity(opportunity, 1_000).build()),
            _ => {}
        }

        let validation = self.core.validate_opportunity(opportunity).await;
        if validation != StrategyResult::Success {
            return Err(validation);
        }

        let pool = Self::mock_pool().ok_or(StrategyResult::Error)?;
        let builder = BundleBuilder::for_opportunity(opportunity, self.core.config().await.bundle_timeout_ms);
        let tx = Transaction::swap(&pool, "WETH", "USDC", 1.0, 2_400.0, 110_000, opportunity.gas_price_gwei, builder.next_nonce());
        Ok(builder.push(tx).build())
    }
}
