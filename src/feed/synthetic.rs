use async_trait::async_trait;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use tracing::debug;

use crate::config::SimulationConfig;
use crate::constants::*;
use crate::dex::{DexKind, LiquidityPool};
use crate::feed::MarketFeed;
use crate::types::MarketSnapshot;

const MIN_BASE_FEE_GWEI: f64 = 5.0;
const MAX_BASE_FEE_GWEI: f64 = 200.0;

/// 시드 기반 합성 마켓
///
/// 블록마다 풀 리저브가 독립적으로 랜덤 워크하므로 DEX 사이에 작은 가격 차이가
/// 생겼다 사라집니다. 같은 시드는 같은 스냅샷 시퀀스를 만듭니다.
pub struct SyntheticMarketFeed {
    rng: StdRng,
    seed: u64,
    block_number: u64,
    block_timestamp: u64,
    block_time_seconds: u64,
    base_fee_gwei: f64,
    tx_rate: f64,
    volatility: f64,
    pools: Vec<LiquidityPool>,
}

impl SyntheticMarketFeed {
    pub fn new(config: &SimulationConfig) -> Self {
        Self::with_pools(config, default_pools())
    }

    pub fn with_pools(config: &SimulationConfig, pools: Vec<LiquidityPool>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            seed: config.seed,
            // 첫 호출에서 start_block 이 나오도록
            block_number: config.start_block.saturating_sub(1),
            block_timestamp: 1_700_000_000,
            block_time_seconds: config.block_time_seconds.max(1),
            base_fee_gwei: 20.0,
            tx_rate: config.tx_rate,
            volatility: config.volatility_percent / 100.0,
            pools,
        }
    }

    pub fn pools(&self) -> &[LiquidityPool] {
        &self.pools
    }

    fn step_pools(&mut self) {
        if !self.volatility.is_finite() || self.volatility <= 0.0 {
            return;
        }
        for pool in &mut self.pools {
            let da: f64 = self.rng.gen_range(-self.volatility..=self.volatility);
            let db: f64 = self.rng.gen_range(-self.volatility..=self.volatility);
            pool.reserve_a = (pool.reserve_a * (1.0 + da)).max(0.0);
            pool.reserve_b = (pool.reserve_b * (1.0 + db)).max(0.0);
        }
    }

    /// EIP-1559 처럼 블록당 최대 12.5% 변동
    fn step_gas(&mut self) -> f64 {
        let change: f64 = self.rng.gen_range(-0.125..=0.125);
        self.base_fee_gwei = (self.base_fee_gwei * (1.0 + change)).clamp(MIN_BASE_FEE_GWEI, MAX_BASE_FEE_GWEI);
        self.rng.gen_range(0.5..3.0)
    }

    fn mempool(&mut self) -> Vec<String> {
        let expected = self.tx_rate * self.block_time_seconds as f64;
        if expected <= 0.0 {
            return Vec::new();
        }
        let count = (expected * self.rng.gen_range(0.5..1.5)).round() as u64;
        (0..count)
            .map(|i| {
                let mut hasher = Keccak256::new();
                hasher.update(self.seed.to_be_bytes());
                hasher.update(self.block_number.to_be_bytes());
                hasher.update(i.to_be_bytes());
                format!("0x{}", hex::encode(hasher.finalize()))
            })
            .collect()
    }

    /// WETH 와 짝지어진 첫 풀에서 토큰의 ETH 가격 도출
    fn token_prices(&self) -> HashMap<String, f64> {
        let mut prices = HashMap::new();
        prices.insert(WETH.to_string(), 1.0);
        for pool in &self.pools {
            if !pool.has_liquidity() {
                continue;
            }
            // price() = reserve_a / reserve_b = token_b 1개의 token_a 가격
            let (token, price_eth) = if pool.token_a == WETH {
                (&pool.token_b, pool.price())
            } else if pool.token_b == WETH {
                (&pool.token_a, 1.0 / pool.price())
            } else {
                continue;
            };
            prices.entry(token.clone()).or_insert(price_eth);
        }
        prices
    }
}

#[async_trait]
impl MarketFeed for SyntheticMarketFeed {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn next_snapshot(&mut self) -> Result<MarketSnapshot> {
        self.block_number += 1;
        self.block_timestamp += self.block_time_seconds;
        self.step_pools();
        let priority_fee_gwei = self.step_gas();
        let mempool_transactions = self.mempool();

        debug!(
            "📦 합성 블록 {}: base fee {:.2} gwei, 멤풀 {}개",
            self.block_number,
            self.base_fee_gwei,
            mempool_transactions.len()
        );

        Ok(MarketSnapshot {
            block_number: self.block_number,
            block_timestamp: self.block_timestamp,
            gas_price_gwei: self.base_fee_gwei + priority_fee_gwei,
            base_fee_gwei: self.base_fee_gwei,
            priority_fee_gwei,
            mempool_transactions,
            token_prices: self.token_prices(),
            pools: self.pools.clone(),
        })
    }
}

fn pool(address: &str, a: &str, b: &str, dex: DexKind, reserve_a: f64, reserve_b: f64, fee: f64) -> Option<LiquidityPool> {
    LiquidityPool::new(address, a, b, dex, reserve_a, reserve_b, fee).ok()
}

/// 기본 합성 마켓: 주요 토큰과 여러 DEX 풀
pub fn default_pools() -> Vec<LiquidityPool> {
    [
        pool("0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc", WETH, USDC, DexKind::UniswapV2, 1_000.0, 2_500_000.0, 0.3),
        pool("0x397ff1542f962076d0bfe58ea045ffa2d347aca0", WETH, USDC, DexKind::Sushiswap, 800.0, 2_000_000.0, 0.3),
        pool("0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640", WETH, USDC, DexKind::UniswapV3, 1_500.0, 3_750_000.0, 0.05),
        pool("0xa478c2975ab1ea89e8196811f51a7b7ade33eb11", WETH, DAI, DexKind::UniswapV2, 700.0, 1_750_000.0, 0.3),
        pool("0x06da0fd433c1a5d7a4faa01111c044910a184553", WETH, USDT, DexKind::Sushiswap, 600.0, 1_500_000.0, 0.3),
        pool("0xbebc44782c7db0a1a60cb6fe97d0b483032ff1c7", USDC, DAI, DexKind::Curve, 5_000_000.0, 5_000_000.0, 0.04),
        pool("0x3416cf6c708da44db2624d63ea0aaef7113527c6", USDC, USDT, DexKind::UniswapV3, 3_000_000.0, 3_000_000.0, 0.01),
        pool("0xbb2b8038a1640196fbe3e38816f3e67cba72d940", WBTC, WETH, DexKind::UniswapV2, 50.0, 800.0, 0.3),
        pool("0xa6f548df93de924d73be7d25dc02554c6bd66db5", WBTC, USDC, DexKind::Balancer, 30.0, 1_200_000.0, 0.2),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> SimulationConfig {
        SimulationConfig { seed, start_block: 100, tx_rate: 2.0, ..Default::default() }
    }

    #[tokio::test]
    async fn test_same_seed_same_sequence() {
        let mut a = SyntheticMarketFeed::new(&config(7));
        let mut b = SyntheticMarketFeed::new(&config(7));
        for _ in 0..5 {
            assert_eq!(a.next_snapshot().await.unwrap(), b.next_snapshot().await.unwrap());
        }

        let mut c = SyntheticMarketFeed::new(&config(8));
        let mut a2 = SyntheticMarketFeed::new(&config(7));
        assert_ne!(a2.next_snapshot().await.unwrap().pools, c.next_snapshot().await.unwrap().pools);
    }

    #[tokio::test]
    async fn test_blocks_advance_and_invariants_hold() {
        let mut feed = SyntheticMarketFeed::new(&config(1));
        let first = feed.next_snapshot().await.unwrap();
        let second = feed.next_snapshot().await.unwrap();

        assert_eq!(first.block_number, 100);
        assert_eq!(second.block_number, 101);
        assert_eq!(second.block_timestamp - first.block_timestamp, BLOCK_TIME);
        assert_eq!(first.pools.len(), default_pools().len());
        assert!(!first.mempool_transactions.is_empty());

        for snapshot in [&first, &second] {
            assert!(snapshot.gas_price_gwei >= snapshot.base_fee_gwei);
            assert!(snapshot.base_fee_gwei >= MIN_BASE_FEE_GWEI);
            assert!(snapshot.pools.iter().all(|p| p.validate().is_ok()));
        }
    }

    #[tokio::test]
    async fn test_non_finite_volatility_keeps_pools_static() {
        for volatility_percent in [f64::NAN, f64::INFINITY] {
            let mut feed = SyntheticMarketFeed::new(&SimulationConfig { volatility_percent, ..config(1) });
            let snapshot = feed.next_snapshot().await.unwrap();
            assert_eq!(snapshot.pools, default_pools());
        }
    }

    #[tokio::test]
    async fn test_token_prices_follow_weth_pools() {
        let mut feed = SyntheticMarketFeed::new(&SimulationConfig { volatility_percent: 0.0, ..config(1) });
        let snapshot = feed.next_snapshot().await.unwrap();
        assert_eq!(snapshot.token_prices[WETH], 1.0);
        assert!((snapshot.token_prices[USDC] - 1_000.0 / 2_500_000.0).abs() < 1e-12);
        assert!((snapshot.token_prices[WBTC] - 16.0).abs() < 1e-9);
    }
}
