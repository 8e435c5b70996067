use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::dex::LiquidityPool;
use crate::types::StrategyContext;

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    price_eth: f64,
    updated_at: Instant,
}

#[derive(Debug, Clone)]
struct CachedPool {
    pool: LiquidityPool,
    updated_at: Instant,
}

/// TTL 기반 시장 데이터 캐시 (토큰 -> ETH 가격, 풀 주소 -> 풀)
///
/// 틱마다 `refresh`로 컨텍스트의 가격과 풀 상태를 반영합니다. 컨텍스트에서 빠진
/// 토큰 가격이나 풀은 TTL 안에서만 이전 값을 사용합니다.
#[derive(Debug, Clone)]
pub struct PriceCache {
    ttl: Duration,
    entries: HashMap<String, CachedPrice>,
    pools: HashMap<String, CachedPool>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: HashMap::new(), pools: HashMap::new() }
    }

    fn is_fresh(&self, updated_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(updated_at) <= self.ttl
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    pub fn refresh(&mut self, context: &StrategyContext) {
        self.refresh_at(context, Instant::now());
    }

    pub fn refresh_at(&mut self, context: &StrategyContext, now: Instant) {
        for (token, price) in &context.token_prices {
            if price.is_finite() && *price > 0.0 {
                self.entries.insert(token.clone(), CachedPrice { price_eth: *price, updated_at: now });
            }
        }
        for (address, pool) in &context.dex_liquidity {
            if pool.has_liquidity() {
                self.pools.insert(address.clone(), CachedPool { pool: pool.clone(), updated_at: now });
            }
        }
    }

    pub fn get(&self, token: &str) -> Option<f64> {
        self.get_at(token, Instant::now())
    }

    /// TTL을 넘긴 값은 None
    pub fn get_at(&self, token: &str, now: Instant) -> Option<f64> {
        self.entries
            .get(token)
            .filter(|entry| self.is_fresh(entry.updated_at, now))
            .map(|entry| entry.price_eth)
    }

    /// TTL 안에 관측된 풀의 최신 상태
    pub fn pools_at(&self, now: Instant) -> Vec<LiquidityPool> {
        self.pools
            .values()
            .filter(|entry| self.is_fresh(entry.updated_at, now))
            .map(|entry| entry.pool.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.pools.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.pools.clear();
    }
}
