use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::Result;

use super::{Condition, Evaluation};
use crate::conditions::{Comparator, ConditionObject, Difference, SourceCategory};
use crate::MarketData;

/// Compares the spread between a fast and a slow moving average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaSpread {
    pub fast: ConditionObject,
    pub slow: ConditionObject,
    pub difference: Difference,
    pub comparator: Comparator,
    pub value: Decimal,
}

impl Condition for MaSpread {
    fn validate(&self) -> Result<()> {
        self.fast.validate(&[SourceCategory::MovingAverage])?;
        self.slow.validate(&[SourceCategory::MovingAverage])
    }

    fn evaluate(&mut self, data: &MarketData) -> Result<Evaluation> {
        let fast = self.fast.resolve(data)?;
        let slow = self.slow.resolve(data)?;
        let spread = self.difference.between(slow, fast)?;
        let met = self.comparator.compare(spread, self.value);
        Ok(Evaluation::new(
            met,
            json!({ "fast": fast, "slow": slow, "spread": spread }),
        ))
    }

    fn candles_required(&self) -> usize {
        self.fast
            .candles_required()
            .max(self.slow.candles_required())
    }
}
