use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::Result;

use super::{Condition, Evaluation};
use crate::conditions::{Comparator, ConditionObject, Shift, SourceCategory};
use crate::MarketData;

/// Freezes `shift(value)` on the first evaluation and compares later values
/// against it. A fixed shift compares against the constant right away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub object: ConditionObject,
    pub shift: Shift,
    pub comparator: Comparator,
    #[serde(skip)]
    target: Option<Decimal>,
}

impl Change {
    pub fn new(object: ConditionObject, shift: Shift, comparator: Comparator) -> Self {
        Self {
            object,
            shift,
            comparator,
            target: None,
        }
    }
}

impl Condition for Change {
    fn validate(&self) -> Result<()> {
        self.object.validate(&[
            SourceCategory::TickerPrice,
            SourceCategory::TickerStat,
            SourceCategory::Candle,
            SourceCategory::MovingAverage,
        ])?;
        self.shift.validate(true)
    }

    fn evaluate(&mut self, data: &MarketData) -> Result<Evaluation> {
        let current = self.object.resolve(data)?;
        let target = match self.shift {
            Shift::Fixed(value) => value,
            shift => *self.target.get_or_insert_with(|| shift.apply(current)),
        };
        let met = self.comparator.compare(current, target);
        Ok(Evaluation::new(
            met,
            json!({ "current": current, "target": target }),
        ))
    }

    fn candles_required(&self) -> usize {
        self.object.candles_required()
    }

    fn reset(&mut self) {
        self.target = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::market;
    use rust_decimal_macros::dec;

    #[test]
    fn fixed_shift_compares_immediately() {
        let mut tool = Change::new(
            ConditionObject::Ask,
            Shift::Fixed(dec!(80)),
            Comparator::Equal,
        );
        assert!(!tool.evaluate(&market(dec!(30), dec!(30), dec!(30))).unwrap().met);
        assert!(tool.evaluate(&market(dec!(80), dec!(80), dec!(80))).unwrap().met);
    }

    #[test]
    fn target_is_frozen_on_first_evaluation() {
        let mut tool = Change::new(
            ConditionObject::Last,
            Shift::Percent(dec!(10)),
            Comparator::AboveOrEqual,
        );
        assert!(!tool.evaluate(&market(dec!(100), dec!(1), dec!(1))).unwrap().met);
        // target stays at 110 even though the price moved
        assert!(!tool.evaluate(&market(dec!(105), dec!(1), dec!(1))).unwrap().met);
        assert!(tool.evaluate(&market(dec!(110), dec!(1), dec!(1))).unwrap().met);
    }

    #[test]
    fn reset_clears_target() {
        let mut tool = Change::new(
            ConditionObject::Last,
            Shift::Units(dec!(-5)),
            Comparator::BelowOrEqual,
        );
        tool.evaluate(&market(dec!(100), dec!(1), dec!(1))).unwrap();
        assert!(tool.evaluate(&market(dec!(95), dec!(1), dec!(1))).unwrap().met);

        tool.reset();
        // new baseline 90
        assert!(!tool.evaluate(&market(dec!(95), dec!(1), dec!(1))).unwrap().met);
    }
}
