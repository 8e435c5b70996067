use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::strategies::arbitrage::optimizer::simulate_path;
use crate::strategies::base::StrategyCore;
use crate::types::ArbitragePath;

/// 경로 가스: 홉별 DEX 조회값 합 + 고정 오버헤드
pub fn estimate_path_gas(path: &ArbitragePath) -> u64 {
    BASE_TX_GAS + ARBITRAGE_OVERHEAD_GAS + path.pools.iter().map(|p| p.dex.swap_gas()).sum::<u64>()
}

/// 수수료 제외 한계 교환비의 곱 (1보다 크면 순환이 이론상 이익)
pub fn spot_rate_product(path: &ArbitragePath) -> f64 {
    match path.hops() {
        Some(hops) => hops.iter().map(|(pool, a_to_b)| pool.spot_rate(*a_to_b)).product(),
        None => 0.0,
    }
}

fn fee_free_output(path: &ArbitragePath, input: f64) -> f64 {
    let hops = match path.hops() {
        Some(hops) => hops,
        None => return 0.0,
    };
    hops.iter()
        .fold(input, |amount, (pool, a_to_b)| pool.swap_output_without_fee(amount, *a_to_b))
}

/// 거래 자체의 가격 영향 (%)
///
/// 수수료를 뺀 spot 교환비와 수수료를 뺀 실현 교환비의 상대 차이입니다.
/// 수수료를 포함하지 않으므로 입력에 대해 단조 증가하고 입력이 0에 가까우면 0에 수렴합니다.
pub fn slippage_percent(path: &ArbitragePath, input: f64) -> f64 {
    let spot = spot_rate_product(path);
    if spot <= 0.0 {
        return 100.0;
    }
    if input <= 0.0 {
        return 0.0;
    }
    let realized = fee_free_output(path, input) / input;
    ((spot - realized) / spot * 100.0).max(0.0)
}

/// 홉별 출력이 반대편 리저브에서 차지하는 최대 비율
pub fn max_reserve_usage(path: &ArbitragePath, input: f64) -> f64 {
    let (hops, outputs) = match (path.hops(), simulate_path(path, input)) {
        (Some(hops), Some(outputs)) => (hops, outputs),
        _ => return f64::INFINITY,
    };
    hops.iter()
        .zip(outputs)
        .map(|((pool, a_to_b), out)| {
            let (_, reserve_out) = pool.reserves_for(*a_to_b);
            if reserve_out > 0.0 {
                out / reserve_out
            } else {
                f64::INFINITY
            }
        })
        .fold(0.0, f64::max)
}

fn within_limits(path: &ArbitragePath, input: f64, max_slippage_percent: f64, max_reserve_fraction: f64) -> bool {
    slippage_percent(path, input) <= max_slippage_percent
        && max_reserve_usage(path, input) < max_reserve_fraction
}

/// 슬리피지/유동성 제약을 만족하는 최적값 이하의 최대 입력
///
/// 두 제약 모두 입력에 대해 단조이므로 [0, optimum] 이분 탐색으로 충분합니다.
pub fn constrain_input(
    path: &ArbitragePath,
    optimum: f64,
    max_slippage_percent: f64,
    max_reserve_fraction: f64,
) -> Option<f64> {
    if optimum <= 0.0 {
        return None;
    }
    if within_limits(path, optimum, max_slippage_percent, max_reserve_fraction) {
        return Some(optimum);
    }

    let mut lo = 0.0;
    let mut hi = optimum;
    for _ in 0..SIZING_BISECTION_ITERATIONS {
        let mid = (lo + hi) / 2.0;
        if within_limits(path, mid, max_slippage_percent, max_reserve_fraction) {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    if lo > 0.0 {
        Some(lo)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    pub slippage_percent: f64,
    pub max_reserve_usage: f64,
    pub profit_eth: f64,
    pub gas_cost_eth: f64,
    /// 0 = 안전, 1 = 한도 경계
    pub score: f64,
}

impl RiskAssessment {
    pub fn net_profit_eth(&self) -> f64 {
        self.profit_eth - self.gas_cost_eth
    }

    /// 가스 비용을 빼도 수익이 남는지
    pub fn survives_gas(&self) -> bool {
        self.net_profit_eth() > 0.0
    }
}

pub fn assess(
    path: &ArbitragePath,
    input: f64,
    profit_eth: f64,
    gas_price_gwei: f64,
    max_slippage_percent: f64,
    max_reserve_fraction: f64,
) -> RiskAssessment {
    let slippage = slippage_percent(path, input);
    let usage = max_reserve_usage(path, input);
    let gas_cost_eth = StrategyCore::estimate_gas_cost(path.gas_estimate, gas_price_gwei);

    let headroom = |value: f64, limit: f64| {
        if limit <= 0.0 {
            0.0
        } else {
            (1.0 - value / limit).clamp(0.0, 1.0)
        }
    };
    let gas_margin = if profit_eth > 0.0 {
        ((profit_eth - gas_cost_eth) / profit_eth).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let safety = headroom(slippage, max_slippage_percent) * headroom(usage, max_reserve_fraction) * gas_margin;

    RiskAssessment {
        slippage_percent: slippage,
        max_reserve_usage: usage,
        profit_eth,
        gas_cost_eth,
        score: 1.0 - safety,
    }
}
