// Gas limits
pub const DEFAULT_GAS_LIMIT: u64 = 500_000;
pub const MAX_GAS_LIMIT: u64 = 30_000_000;

/// 모든 트랜잭션의 기본 가스 (intrinsic)
pub const BASE_TX_GAS: u64 = 21_000;
/// 아비트래지 실행 컨트랙트 호출 오버헤드 (토큰 승인, 잔액 검증 등)
pub const ARBITRAGE_OVERHEAD_GAS: u64 = 45_000;

// Per-hop swap gas (DEX별 평균값)
pub const UNISWAP_V2_SWAP_GAS: u64 = 110_000;
pub const SUSHISWAP_SWAP_GAS: u64 = 110_000;
pub const UNISWAP_V3_SWAP_GAS: u64 = 150_000;
pub const BALANCER_SWAP_GAS: u64 = 180_000;
pub const CURVE_SWAP_GAS: u64 = 200_000;
pub const BANCOR_SWAP_GAS: u64 = 160_000;

// Time constants
pub const BLOCK_TIME: u64 = 12;
pub const DEFAULT_BUNDLE_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_PRICE_CACHE_TTL_MS: u64 = 30_000;

// Profit thresholds
pub const MIN_PROFIT_ETH: f64 = 0.01;
pub const MAX_SLIPPAGE_PERCENT: f64 = 0.5;

// Gas price limits (in gwei)
pub const MAX_GAS_PRICE_GWEI: u64 = 100;
pub const GWEI_TO_ETH: f64 = 1e-9;

// Path search
pub const DEFAULT_MAX_PATH_LENGTH: usize = 4;
/// 한 홉의 출력이 상대 리저브에서 차지할 수 있는 최대 비율
pub const DEFAULT_MAX_RESERVE_FRACTION: f64 = 0.3;
pub const TERNARY_SEARCH_ITERATIONS: usize = 100;
pub const SIZING_BISECTION_ITERATIONS: usize = 60;
/// 경로 후보 몇 개마다 취소 토큰을 확인할지
pub const CANCEL_POLL_INTERVAL: usize = 64;

// Bundle limits
pub const MAX_BUNDLE_TRANSACTIONS: usize = 10;
/// `--export-json` 없이 실행할 때 보관하는 최근 번들 수
pub const DEFAULT_COLLECTOR_CAPACITY: usize = 1_000;

// Common token symbols
pub const WETH: &str = "WETH";
pub const USDC: &str = "USDC";
pub const USDT: &str = "USDT";
pub const DAI: &str = "DAI";
pub const WBTC: &str = "WBTC";
