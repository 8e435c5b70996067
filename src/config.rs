use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use anyhow::{anyhow, Context, Result};

use crate::constants::*;
use crate::dex::DexKind;

/// 마켓 데이터 소스 모드
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    /// 블록 시간에 맞춰 진행하는 합성 피드
    Realtime,
    /// 저장된 스냅샷 재생
    Historical,
    /// 가능한 빠르게 진행하는 합성 피드
    Synthetic,
}

impl std::str::FromStr for SimulationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "realtime" => Ok(SimulationMode::Realtime),
            "historical" => Ok(SimulationMode::Historical),
            "synthetic" => Ok(SimulationMode::Synthetic),
            other => Err(anyhow!("Unknown simulation mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub mode: SimulationMode,
    pub tick_interval_ms: u64,
    /// 처리할 블록 수 (없으면 무제한)
    pub block_count: Option<u64>,
    /// 실행 시간 제한 (초)
    pub duration_seconds: Option<u64>,
    pub start_block: u64,
    pub seed: u64,
    /// 합성 멤풀 트랜잭션 생성률 (tx/s)
    pub tx_rate: f64,
    pub block_time_seconds: u64,
    /// 틱마다 리저브가 흔들리는 폭 (%)
    pub volatility_percent: f64,
    /// historical 모드에서 읽을 스냅샷 JSON 파일
    pub replay_file: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mode: SimulationMode::Synthetic,
            tick_interval_ms: 100,
            block_count: None,
            duration_seconds: None,
            start_block: 18_000_000,
            seed: 42,
            tx_rate: 50.0,
            block_time_seconds: BLOCK_TIME,
            volatility_percent: 0.5,
            replay_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceConfig {
    /// 틱 지연 목표치. 초과 시 경고 로그
    pub latency_target_ms: u64,
    pub stats_interval_ms: u64,
    pub max_bundle_transactions: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            latency_target_ms: 50,
            stats_interval_ms: 1_000,
            max_bundle_transactions: MAX_BUNDLE_TRANSACTIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
    pub visualization: bool,
    pub visualization_interval_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            visualization: false,
            visualization_interval_ms: 1_000,
        }
    }
}

/// 전략별 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub enabled: bool,
    pub min_profit_eth: f64,
    pub max_slippage_percent: f64,
    /// 비어 있으면 모든 DEX 허용
    pub target_dexes: Vec<DexKind>,
    pub gas_limit: u64,
    pub max_gas_price_gwei: f64,
    pub bundle_timeout_ms: u64,
    pub max_path_length: usize,
    /// 비어 있으면 풀에 등장하는 모든 토큰이 시작점
    pub base_tokens: Vec<String>,
    pub max_reserve_fraction: f64,
    pub price_cache_ttl_ms: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_profit_eth: MIN_PROFIT_ETH,
            max_slippage_percent: MAX_SLIPPAGE_PERCENT,
            target_dexes: vec![DexKind::UniswapV2, DexKind::UniswapV3, DexKind::Sushiswap],
            gas_limit: DEFAULT_GAS_LIMIT,
            max_gas_price_gwei: MAX_GAS_PRICE_GWEI as f64,
            bundle_timeout_ms: DEFAULT_BUNDLE_TIMEOUT_MS,
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
            base_tokens: vec![WETH.to_string()],
            max_reserve_fraction: DEFAULT_MAX_RESERVE_FRACTION,
            price_cache_ttl_ms: DEFAULT_PRICE_CACHE_TTL_MS,
        }
    }
}

impl StrategyConfig {
    pub fn allows_dex(&self, dex: DexKind) -> bool {
        self.target_dexes.is_empty() || self.target_dexes.contains(&dex)
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.min_profit_eth.is_finite() || self.min_profit_eth < 0.0 {
            return Err(anyhow!("Strategy {}: min_profit_eth must be >= 0", name));
        }
        if !(0.0..=100.0).contains(&self.max_slippage_percent) {
            return Err(anyhow!("Strategy {}: max_slippage_percent must be in [0, 100]", name));
        }
        if self.gas_limit == 0 || self.gas_limit > MAX_GAS_LIMIT {
            return Err(anyhow!("Strategy {}: gas_limit must be in (0, {}]", name, MAX_GAS_LIMIT));
        }
        if self.max_gas_price_gwei <= 0.0 {
            return Err(anyhow!("Strategy {}: max_gas_price_gwei must be positive", name));
        }
        if self.bundle_timeout_ms == 0 {
            return Err(anyhow!("Strategy {}: bundle_timeout_ms must be greater than 0", name));
        }
        if self.max_path_length < 2 {
            return Err(anyhow!("Strategy {}: max_path_length must be at least 2", name));
        }
        if !(self.max_reserve_fraction > 0.0 && self.max_reserve_fraction <= 1.0) {
            return Err(anyhow!("Strategy {}: max_reserve_fraction must be in (0, 1]", name));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategyConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let mut strategies = BTreeMap::new();
        strategies.insert("arbitrage".to_string(), StrategyConfig::default());
        Self {
            simulation: SimulationConfig::default(),
            performance: PerformanceConfig::default(),
            monitoring: MonitoringConfig::default(),
            strategies,
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.simulation.tick_interval_ms == 0 {
            return Err(anyhow!("simulation.tick_interval_ms must be greater than 0"));
        }
        if !self.simulation.tx_rate.is_finite() || self.simulation.tx_rate < 0.0 {
            return Err(anyhow!("simulation.tx_rate must be >= 0"));
        }
        if !self.simulation.volatility_percent.is_finite() || self.simulation.volatility_percent < 0.0 {
            return Err(anyhow!("simulation.volatility_percent must be a finite value >= 0"));
        }
        if self.simulation.mode == SimulationMode::Historical && self.simulation.replay_file.is_none() {
            return Err(anyhow!("historical mode requires simulation.replay_file"));
        }
        if self.performance.stats_interval_ms == 0 {
            return Err(anyhow!("performance.stats_interval_ms must be greater than 0"));
        }
        if self.performance.max_bundle_transactions == 0 {
            return Err(anyhow!("performance.max_bundle_transactions must be greater than 0"));
        }

        // 비활성 전략은 검증하지 않음
        for (name, strategy) in &self.strategies {
            if strategy.enabled {
                strategy.validate(name)?;
            }
        }

        Ok(())
    }

    /// 전체 비활성화 후 목록에 있는 전략만 활성화. 없는 이름은 기본 설정으로 추가
    pub fn apply_strategy_selection(&mut self, selection: &[String]) {
        if selection.is_empty() {
            return;
        }
        for strategy in self.strategies.values_mut() {
            strategy.enabled = false;
        }
        for name in selection {
            self.strategies.entry(name.clone()).or_default().enabled = true;
        }
    }

    pub fn enabled_strategies(&self) -> Vec<String> {
        self.strategies
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn strategy(&self, name: &str) -> Option<&StrategyConfig> {
        self.strategies.get(name)
    }
}
