// xCrack MEV Simulator Library

pub mod config;
pub mod core;
pub mod dex;
pub mod feed;
pub mod mocks;
pub mod monitoring;
pub mod strategies;

// Core types
pub mod types;
pub mod constants;

// Re-exports for convenience
pub use config::Config;
pub use crate::core::{Bundle, BundleBuilder, BundleCollector, SimulationStats, Simulator, SubmissionSink};
pub use dex::{DexKind, LiquidityPool};
pub use feed::{MarketFeed, ReplayFeed, SyntheticMarketFeed};
pub use monitoring::{MetricsRegistry, MetricsSink};
pub use strategies::{ArbitrageStrategy, Strategy, StrategyEngine, StrategyStats};
pub use types::{MarketSnapshot, Opportunity, SimResult, SimulationState, SimulatorError, StrategyContext, StrategyResult};
