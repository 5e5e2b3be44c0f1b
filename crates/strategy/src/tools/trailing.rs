use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::{Error, Result};

use super::{Condition, Evaluation};
use crate::conditions::{Comparator, ConditionObject, Difference, SourceCategory};
use crate::MarketData;

/// Compares the change of a candle or moving-average value between `back`
/// candles ago and now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trailing {
    pub object: ConditionObject,
    pub back: usize,
    pub difference: Difference,
    pub comparator: Comparator,
    pub value: Decimal,
}

impl Condition for Trailing {
    fn validate(&self) -> Result<()> {
        self.object
            .validate(&[SourceCategory::Candle, SourceCategory::MovingAverage])?;
        if self.back == 0 {
            return Err(Error::config("trailing back-index must be at least 1"));
        }
        Ok(())
    }

    fn evaluate(&mut self, data: &MarketData) -> Result<Evaluation> {
        let past = self.object.resolve_at(data, self.back)?;
        let now = self.object.resolve(data)?;
        let delta = self.difference.between(past, now)?;
        let met = self.comparator.compare(delta, self.value);
        Ok(Evaluation::new(
            met,
            json!({ "past": past, "current": now, "delta": delta }),
        ))
    }

    fn candles_required(&self) -> usize {
        self.object.candles_required() + self.back
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{CandleField, MaKind};
    use crate::testing::{candles, market};
    use rust_decimal_macros::dec;

    #[test]
    fn percent_rise_over_back_window() {
        let mut data = market(dec!(1), dec!(1), dec!(1));
        data.candles = candles(&[dec!(100), dec!(104), dec!(106)]);
        let mut tool = Trailing {
            object: ConditionObject::Candle {
                field: CandleField::Close,
                offset: 0,
            },
            back: 2,
            difference: Difference::Percent,
            comparator: Comparator::AboveOrEqual,
            value: dec!(5),
        };
        assert_eq!(tool.candles_required(), 3);
        assert!(tool.evaluate(&data).unwrap().met);

        tool.back = 1;
        assert!(!tool.evaluate(&data).unwrap().met);
    }

    #[test]
    fn moving_average_trend() {
        let mut data = market(dec!(1), dec!(1), dec!(1));
        data.candles = candles(&[dec!(10), dec!(10), dec!(8), dec!(6)]);
        let mut tool = Trailing {
            object: ConditionObject::MovingAverage {
                kind: MaKind::Simple,
                period: 2,
                field: CandleField::Close,
                offset: 0,
            },
            back: 1,
            difference: Difference::Units,
            comparator: Comparator::Below,
            value: Decimal::ZERO,
        };
        // SMA 9 -> 7
        assert!(tool.evaluate(&data).unwrap().met);
    }

    #[test]
    fn ticker_sources_and_zero_back_are_rejected() {
        let tool = Trailing {
            object: ConditionObject::Last,
            back: 1,
            difference: Difference::Units,
            comparator: Comparator::Above,
            value: Decimal::ZERO,
        };
        assert!(tool.validate().is_err());

        let tool = Trailing {
            object: ConditionObject::Candle {
                field: CandleField::Close,
                offset: 0,
            },
            back: 0,
            ..tool
        };
        assert!(tool.validate().is_err());
    }
}
