//! Constant-product 유동성 풀 모델
//!
//! 리저브, 수수료, 가격, 스왑 출력 계산만 담당하는 순수 값 타입입니다.
//! 리저브가 0인 경우는 에러가 아니라 "유동성 없음"으로 취급합니다.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::*;

/// DEX 종류
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DexKind {
    UniswapV2,
    UniswapV3,
    Sushiswap,
    Balancer,
    Curve,
    Bancor,
}

impl DexKind {
    /// 단일 스왑의 가스 비용 (시뮬레이션이 아닌 조회 테이블)
    pub fn swap_gas(&self) -> u64 {
        match self {
            DexKind::UniswapV2 => UNISWAP_V2_SWAP_GAS,
            DexKind::Sushiswap => SUSHISWAP_SWAP_GAS,
            DexKind::UniswapV3 => UNISWAP_V3_SWAP_GAS,
            DexKind::Balancer => BALANCER_SWAP_GAS,
            DexKind::Curve => CURVE_SWAP_GAS,
            DexKind::Bancor => BANCOR_SWAP_GAS,
        }
    }
}

impl std::fmt::Display for DexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DexKind::UniswapV2 => write!(f, "uniswap_v2"),
            DexKind::UniswapV3 => write!(f, "uniswap_v3"),
            DexKind::Sushiswap => write!(f, "sushiswap"),
            DexKind::Balancer => write!(f, "balancer"),
            DexKind::Curve => write!(f, "curve"),
            DexKind::Bancor => write!(f, "bancor"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    #[error("pool {pool}: reserve must be finite and non-negative, got {value}")]
    InvalidReserve { pool: String, value: f64 },

    #[error("pool {pool}: fee percent must be in [0, 100), got {fee}")]
    InvalidFee { pool: String, fee: f64 },

    #[error("pool {pool}: token_a and token_b must differ ({token})")]
    IdenticalTokens { pool: String, token: String },
}

/// AMM 유동성 풀 (x * y = k)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiquidityPool {
    pub address: String,
    pub token_a: String,
    pub token_b: String,
    pub dex: DexKind,
    pub reserve_a: f64,
    pub reserve_b: f64,
    pub fee_percent: f64,
}

impl LiquidityPool {
    pub fn new(
        address: impl Into<String>,
        token_a: impl Into<String>,
        token_b: impl Into<String>,
        dex: DexKind,
        reserve_a: f64,
        reserve_b: f64,
        fee_percent: f64,
    ) -> Result<Self, PoolError> {
        let pool = Self {
            address: address.into(),
            token_a: token_a.into(),
            token_b: token_b.into(),
            dex,
            reserve_a,
            reserve_b,
            fee_percent,
        };
        pool.validate()?;
        Ok(pool)
    }

    /// 불변식 검증: 리저브 >= 0, 수수료 [0, 100)
    pub fn validate(&self) -> Result<(), PoolError> {
        for value in [self.reserve_a, self.reserve_b] {
            if !value.is_finite() || value < 0.0 {
                return Err(PoolError::InvalidReserve { pool: self.address.clone(), value });
            }
        }
        if !self.fee_percent.is_finite() || !(0.0..100.0).contains(&self.fee_percent) {
            return Err(PoolError::InvalidFee { pool: self.address.clone(), fee: self.fee_percent });
        }
        if self.token_a == self.token_b {
            return Err(PoolError::IdenticalTokens {
                pool: self.address.clone(),
                token: self.token_a.clone(),
            });
        }
        Ok(())
    }

    /// reserve_a / reserve_b. reserve_b가 0이면 0
    ///
    /// token_b 1개의 가격을 token_a 단위로 표현한 값입니다. 이 방향 규약은
    /// 하위 수익성 비교 전체가 의존하므로 뒤집지 마세요.
    pub fn price(&self) -> f64 {
        if self.reserve_b == 0.0 {
            return 0.0;
        }
        self.reserve_a / self.reserve_b
    }

    pub fn has_liquidity(&self) -> bool {
        self.reserve_a > 0.0 && self.reserve_b > 0.0
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_a == token || self.token_b == token
    }

    /// token이 주어졌을 때 반대편 토큰
    pub fn other_token(&self, token: &str) -> Option<&str> {
        if self.token_a == token {
            Some(&self.token_b)
        } else if self.token_b == token {
            Some(&self.token_a)
        } else {
            None
        }
    }

    /// token_in을 넣는 방향이 a -> b 인지
    pub fn direction_from(&self, token_in: &str) -> Option<bool> {
        if self.token_a == token_in {
            Some(true)
        } else if self.token_b == token_in {
            Some(false)
        } else {
            None
        }
    }

    /// (reserve_in, reserve_out)
    pub fn reserves_for(&self, a_to_b: bool) -> (f64, f64) {
        if a_to_b {
            (self.reserve_a, self.reserve_b)
        } else {
            (self.reserve_b, self.reserve_a)
        }
    }

    /// 수수료를 제외한 한계 교환비 (입력 1단위당 출력)
    pub fn spot_rate(&self, a_to_b: bool) -> f64 {
        let price = self.price();
        if price == 0.0 || self.reserve_a == 0.0 {
            return 0.0;
        }
        if a_to_b {
            1.0 / price
        } else {
            price
        }
    }

    /// Constant-product 스왑 출력. 수수료는 입력에서 먼저 차감됩니다.
    pub fn swap_output(&self, input_amount: f64, a_to_b: bool) -> f64 {
        self.swap_output_with_fee(input_amount, a_to_b, self.fee_percent)
    }

    /// 수수료 없이 계산한 출력 (순수 가격 영향 측정용)
    pub fn swap_output_without_fee(&self, input_amount: f64, a_to_b: bool) -> f64 {
        self.swap_output_with_fee(input_amount, a_to_b, 0.0)
    }

    fn swap_output_with_fee(&self, input_amount: f64, a_to_b: bool, fee_percent: f64) -> f64 {
        if !input_amount.is_finite() || input_amount <= 0.0 || !self.has_liquidity() {
            return 0.0;
        }
        let (reserve_in, reserve_out) = self.reserves_for(a_to_b);
        let input_with_fee = input_amount * (1.0 - fee_percent / 100.0);
        (input_with_fee * reserve_out) / (reserve_in + input_with_fee)
    }

    /// 스왑 이후의 풀 상태. 수수료는 풀에 남습니다 (Uniswap V2와 동일).
    pub fn after_swap(&self, input_amount: f64, a_to_b: bool) -> LiquidityPool {
        let output = self.swap_output(input_amount, a_to_b);
        let mut next = self.clone();
        if output <= 0.0 {
            return next;
        }
        if a_to_b {
            next.reserve_a += input_amount;
            next.reserve_b -= output;
        } else {
            next.reserve_b += input_amount;
            next.reserve_a -= output;
        }
        next
    }
}
