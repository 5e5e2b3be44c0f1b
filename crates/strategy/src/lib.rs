pub mod conditions;
pub mod config;
pub mod indicators;
pub mod market;
pub mod mode;
pub mod outcomes;
pub mod registry;
pub mod sequence;
pub mod strategy;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use config::StrategyConfig;
pub use market::MarketData;
pub use mode::{StrategyMode, StreamMode};
pub use outcomes::Outcome;
pub use registry::StrategyRegistry;
pub use sequence::Sequence;
pub use strategy::Strategy;
pub use tools::{Tool, ToolKind};
