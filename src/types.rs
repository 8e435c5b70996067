use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::time::Instant;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::dex::{DexKind, LiquidityPool};

/// 시뮬레이션된 스왑 트랜잭션 (서명/브로드캐스트되지 않음)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub hash: String,
    pub pool: String,
    pub dex: DexKind,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
    pub min_amount_out: f64,
    pub gas_limit: u64,
    pub gas_price_gwei: f64,
    pub nonce: u64,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn swap(
        pool: &LiquidityPool,
        token_in: &str,
        token_out: &str,
        amount_in: f64,
        min_amount_out: f64,
        gas_limit: u64,
        gas_price_gwei: f64,
        nonce: u64,
    ) -> Self {
        let mut tx = Self {
            hash: String::new(),
            pool: pool.address.clone(),
            dex: pool.dex,
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            min_amount_out,
            gas_limit,
            gas_price_gwei,
            nonce,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    /// 필드 전체에 대한 keccak-256 다이제스트 (0x 접두 hex)
    pub fn compute_hash(&self) -> String {
        let mut hasher = Keccak256::new();
        hasher.update(self.pool.as_bytes());
        hasher.update(self.dex.to_string().as_bytes());
        hasher.update(self.token_in.as_bytes());
        hasher.update(self.token_out.as_bytes());
        hasher.update(self.amount_in.to_be_bytes());
        hasher.update(self.min_amount_out.to_be_bytes());
        hasher.update(self.gas_limit.to_be_bytes());
        hasher.update(self.gas_price_gwei.to_be_bytes());
        hasher.update(self.nonce.to_be_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

/// 전략 실행 결과 (닫힌 집합)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyResult {
    Success,
    Failed,
    NoOpportunity,
    InsufficientProfit,
    HighSlippage,
    GasTooHigh,
    Timeout,
    Error,
}

impl StrategyResult {
    /// 통계 외에 경고가 필요한 실패인지
    pub fn is_fault(&self) -> bool {
        matches!(self, StrategyResult::Failed | StrategyResult::Error)
    }
}

impl std::fmt::Display for StrategyResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyResult::Success => write!(f, "SUCCESS"),
            StrategyResult::Failed => write!(f, "FAILED"),
            StrategyResult::NoOpportunity => write!(f, "NO_OPPORTUNITY"),
            StrategyResult::InsufficientProfit => write!(f, "INSUFFICIENT_PROFIT"),
            StrategyResult::HighSlippage => write!(f, "HIGH_SLIPPAGE"),
            StrategyResult::GasTooHigh => write!(f, "GAS_TOO_HIGH"),
            StrategyResult::Timeout => write!(f, "TIMEOUT"),
            StrategyResult::Error => write!(f, "ERROR"),
        }
    }
}

/// 아비트래지 경로 종류
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    CrossDex,
    Triangular,
    Complex,
}

/// 순환 아비트래지 경로
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArbitragePath {
    pub kind: PathKind,
    /// 순환이므로 첫 토큰 == 마지막 토큰
    pub tokens: Vec<String>,
    pub pools: Vec<LiquidityPool>,
    pub expected_profit: f64,
    pub required_input: f64,
    pub gas_estimate: u64,
}

impl ArbitragePath {
    pub fn new(kind: PathKind, tokens: Vec<String>, pools: Vec<LiquidityPool>) -> Self {
        Self {
            kind,
            tokens,
            pools,
            expected_profit: 0.0,
            required_input: 0.0,
            gas_estimate: 0,
        }
    }

    pub fn hop_count(&self) -> usize {
        self.pools.len()
    }

    pub fn start_token(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    /// 경로 구조가 닫힌 순환인지 (수익성 제외)
    pub fn is_closed_cycle(&self) -> bool {
        self.tokens.len() >= 3
            && self.pools.len() >= 2
            && self.pools.len() + 1 == self.tokens.len()
            && self.tokens.first() == self.tokens.last()
    }

    pub fn is_valid(&self) -> bool {
        self.is_closed_cycle() && self.expected_profit > 0.0
    }

    /// 각 홉의 (풀, a_to_b) 쌍. 토큰이 풀에 없으면 None
    pub fn hops(&self) -> Option<Vec<(&LiquidityPool, bool)>> {
        self.pools
            .iter()
            .zip(self.tokens.iter())
            .map(|(pool, token_in)| pool.direction_from(token_in).map(|dir| (pool, dir)))
            .collect()
    }

    pub fn describe(&self) -> String {
        self.tokens.join(" -> ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArbitrageDetails {
    pub path: ArbitragePath,
    pub amount_in: f64,
    /// 홉별 예상 출력 (트랜잭션의 min_amount_out 계산에 사용)
    pub hop_outputs: Vec<f64>,
    pub risk_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OpportunityDetails {
    Arbitrage(ArbitrageDetails),
    Generic { description: String },
}

/// 탐지된 MEV 기회
///
/// 탐지 단계에서 한 번 만들어지고, 같은 전략의 실행 단계에서 한 번 소비됩니다.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opportunity {
    pub id: String,
    pub strategy_name: String,
    pub block_number: u64,
    pub expected_profit_eth: f64,
    pub estimated_gas_cost_eth: f64,
    pub net_profit_eth: f64,
    pub slippage_percent: f64,
    pub gas_limit: u64,
    pub gas_price_gwei: f64,
    pub timestamp: DateTime<Utc>,
    pub target_transactions: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub details: OpportunityDetails,
}

impl Opportunity {
    pub fn new(strategy_name: impl Into<String>, block_number: u64, details: OpportunityDetails) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            strategy_name: strategy_name.into(),
            block_number,
            expected_profit_eth: 0.0,
            estimated_gas_cost_eth: 0.0,
            net_profit_eth: 0.0,
            slippage_percent: 0.0,
            gas_limit: 0,
            gas_price_gwei: 0.0,
            timestamp: Utc::now(),
            target_transactions: Vec::new(),
            metadata: HashMap::new(),
            details,
        }
    }

    /// net = expected - gas 는 항상 여기서만 계산됩니다
    pub fn with_profit(mut self, expected_profit_eth: f64, estimated_gas_cost_eth: f64) -> Self {
        self.expected_profit_eth = expected_profit_eth;
        self.estimated_gas_cost_eth = estimated_gas_cost_eth;
        self.net_profit_eth = expected_profit_eth - estimated_gas_cost_eth;
        self
    }

    pub fn with_gas(mut self, gas_limit: u64, gas_price_gwei: f64) -> Self {
        self.gas_limit = gas_limit;
        self.gas_price_gwei = gas_price_gwei;
        self
    }

    pub fn with_slippage(mut self, slippage_percent: f64) -> Self {
        self.slippage_percent = slippage_percent;
        self
    }

    pub fn with_targets(mut self, target_transactions: Vec<String>) -> Self {
        self.target_transactions = target_transactions;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn is_profitable(&self) -> bool {
        self.net_profit_eth > 0.0
    }

    pub fn is_within_slippage_limit(&self, max_slippage_percent: f64) -> bool {
        self.slippage_percent <= max_slippage_percent
    }

    pub fn is_within_gas_limit(&self, max_gas_price_gwei: f64) -> bool {
        self.gas_price_gwei <= max_gas_price_gwei
    }

    pub fn arbitrage_details(&self) -> Option<&ArbitrageDetails> {
        match &self.details {
            OpportunityDetails::Arbitrage(details) => Some(details),
            _ => None,
        }
    }
}

/// 마켓 피드가 내보내는 원시 스냅샷 (직렬화 가능)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MarketSnapshot {
    pub block_number: u64,
    pub block_timestamp: u64,
    pub gas_price_gwei: f64,
    pub base_fee_gwei: f64,
    pub priority_fee_gwei: f64,
    #[serde(default)]
    pub mempool_transactions: Vec<String>,
    /// 토큰 심볼 -> ETH 가격
    #[serde(default)]
    pub token_prices: HashMap<String, f64>,
    #[serde(default)]
    pub pools: Vec<LiquidityPool>,
}

/// 한 틱 동안 모든 전략이 읽기 전용으로 공유하는 컨텍스트
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub block_number: u64,
    pub block_timestamp: u64,
    pub gas_price_gwei: f64,
    pub base_fee_gwei: f64,
    pub priority_fee_gwei: f64,
    pub mempool_transactions: Vec<String>,
    pub token_prices: HashMap<String, f64>,
    /// 풀 주소 -> 풀
    pub dex_liquidity: HashMap<String, LiquidityPool>,
    pub cancel: CancellationToken,
    pub tick_started: Instant,
}

impl StrategyContext {
    pub fn from_snapshot(snapshot: MarketSnapshot, cancel: CancellationToken) -> Self {
        let dex_liquidity = snapshot
            .pools
            .into_iter()
            .map(|pool| (pool.address.clone(), pool))
            .collect();

        Self {
            block_number: snapshot.block_number,
            block_timestamp: snapshot.block_timestamp,
            gas_price_gwei: snapshot.gas_price_gwei,
            base_fee_gwei: snapshot.base_fee_gwei,
            priority_fee_gwei: snapshot.priority_fee_gwei,
            mempool_transactions: snapshot.mempool_transactions,
            token_prices: snapshot.token_prices,
            dex_liquidity,
            cancel,
            tick_started: Instant::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token_price(&self, token: &str) -> Option<f64> {
        self.token_prices.get(token).copied()
    }
}

/// 파이프라인 상태
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SimulationState {
    Initializing = 0,
    Running = 1,
    Paused = 2,
    Stopping = 3,
    Stopped = 4,
    Error = 5,
}

impl SimulationState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SimulationState::Initializing,
            1 => SimulationState::Running,
            2 => SimulationState::Paused,
            3 => SimulationState::Stopping,
            4 => SimulationState::Stopped,
            _ => SimulationState::Error,
        }
    }
}

impl std::fmt::Display for SimulationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationState::Initializing => write!(f, "Initializing"),
            SimulationState::Running => write!(f, "Running"),
            SimulationState::Paused => write!(f, "Paused"),
            SimulationState::Stopping => write!(f, "Stopping"),
            SimulationState::Stopped => write!(f, "Stopped"),
            SimulationState::Error => write!(f, "Error"),
        }
    }
}

/// Error types
#[derive(thiserror::Error, Debug)]
pub enum SimulatorError {
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: SimulationState, to: SimulationState },

    #[error("simulator not initialized (state: {0})")]
    NotInitialized(SimulationState),

    #[error("strategy already registered: {0}")]
    DuplicateStrategy(String),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("strategy {name} failed to initialize: {reason}")]
    StrategyInit { name: String, reason: String },

    #[error("market feed failure: {0}")]
    Feed(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type SimResult<T> = Result<T, SimulatorError>;
