pub mod pool;

pub use pool::{DexKind, LiquidityPool, PoolError};
