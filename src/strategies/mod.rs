pub mod arbitrage;
pub mod base;
pub mod manager;
pub mod stats;
pub mod traits;

// Re-exports
pub use arbitrage::ArbitrageStrategy;
pub use base::StrategyCore;
pub use manager::{StrategyEngine, StrategyOutcome, TickReport};
pub use stats::StrategyStats;
pub use traits::Strategy;
