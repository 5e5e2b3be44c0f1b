use serde::{Deserialize, Serialize};

/// Which stream mode a strategy is evaluated in, derived from its outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    /// Places buy orders; considered while the stream holds no position.
    Buy,
    /// Sells or averages down; considered while the stream holds a position.
    Sell,
    /// Only notifies; considered in either mode.
    Any,
}

/// Whether a stream currently holds enough base asset to sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    Buy,
    Sell,
}

impl StrategyMode {
    pub fn applies_to(self, stream: StreamMode) -> bool {
        matches!(
            (self, stream),
            (StrategyMode::Any, _)
                | (StrategyMode::Buy, StreamMode::Buy)
                | (StrategyMode::Sell, StreamMode::Sell)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_mode_applies_everywhere() {
        assert!(StrategyMode::Any.applies_to(StreamMode::Buy));
        assert!(StrategyMode::Any.applies_to(StreamMode::Sell));
        assert!(StrategyMode::Buy.applies_to(StreamMode::Buy));
        assert!(!StrategyMode::Buy.applies_to(StreamMode::Sell));
        assert!(!StrategyMode::Sell.applies_to(StreamMode::Buy));
    }
}
