pub mod strategy_mock;

pub use strategy_mock::{MockBehavior, MockStrategy};
