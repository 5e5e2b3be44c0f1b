use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::{Error, Result};

use super::{Condition, Evaluation};
use crate::conditions::{CandleField, Comparator, ConditionObject, Shift, SourceCategory};
use crate::indicators::{to_decimal, to_f64s, BollingerIndicator};
use crate::MarketData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Upper,
    Middle,
    Lower,
}

/// Compares a price against a (optionally shifted) Bollinger band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bollinger {
    pub period: usize,
    pub deviation: Decimal,
    #[serde(default)]
    pub field: CandleField,
    pub band: Band,
    pub price: ConditionObject,
    #[serde(default)]
    pub shift: Option<Shift>,
    pub comparator: Comparator,
}

impl Bollinger {
    fn indicator(&self) -> BollingerIndicator {
        BollingerIndicator::new(self.period, self.deviation.to_f64().unwrap_or(0.0))
    }
}

impl Condition for Bollinger {
    fn validate(&self) -> Result<()> {
        if self.period < 2 {
            return Err(Error::config("Bollinger period must be >= 2"));
        }
        if self.deviation <= Decimal::ZERO {
            return Err(Error::config("Bollinger deviation must be positive"));
        }
        self.price
            .validate(&[SourceCategory::TickerPrice, SourceCategory::Candle])?;
        match self.shift {
            Some(shift) => shift.validate(false),
            None => Ok(()),
        }
    }

    fn evaluate(&mut self, data: &MarketData) -> Result<Evaluation> {
        let indicator = self.indicator();
        let values = to_f64s(&data.field_values(self.field, 0))?;
        let bands = indicator.compute(&values).ok_or_else(|| {
            Error::data(format!(
                "Bollinger bands need {} candles, got {}",
                indicator.candles_required(),
                values.len()
            ))
        })?;

        let band = to_decimal(match self.band {
            Band::Upper => bands.upper,
            Band::Middle => bands.middle,
            Band::Lower => bands.lower,
        })?;
        let target = self.shift.map_or(band, |shift| shift.apply(band));
        let current = self.price.resolve(data)?;
        let met = self.comparator.compare(current, target);
        Ok(Evaluation::new(
            met,
            json!({
                "current": current,
                "upper": bands.upper,
                "middle": bands.middle,
                "lower": bands.lower,
                "target": target,
            }),
        ))
    }

    fn candles_required(&self) -> usize {
        self.indicator()
            .candles_required()
            .max(self.price.candles_required())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candles, market};
    use rust_decimal_macros::dec;

    fn tool(band: Band, comparator: Comparator) -> Bollinger {
        Bollinger {
            period: 8,
            deviation: dec!(2),
            field: CandleField::Close,
            band,
            price: ConditionObject::Bid,
            shift: None,
            comparator,
        }
    }

    fn data(bid: Decimal) -> MarketData {
        let mut data = market(bid, bid, bid);
        data.candles = candles(&[
            dec!(2),
            dec!(4),
            dec!(4),
            dec!(4),
            dec!(5),
            dec!(5),
            dec!(7),
            dec!(9),
        ]);
        data
    }

    #[test]
    fn price_below_lower_band() {
        // bands: 9 / 5 / 1
        let mut below = tool(Band::Lower, Comparator::Below);
        assert!(below.evaluate(&data(dec!(0.5))).unwrap().met);
        assert!(!below.evaluate(&data(dec!(3))).unwrap().met);
    }

    #[test]
    fn shifted_upper_band() {
        let mut above = tool(Band::Upper, Comparator::Above);
        above.shift = Some(Shift::Percent(dec!(10)));
        assert!(!above.evaluate(&data(dec!(9.5))).unwrap().met);
        assert!(above.evaluate(&data(dec!(10))).unwrap().met);
    }

    #[test]
    fn validation() {
        let mut bad = tool(Band::Middle, Comparator::Above);
        bad.deviation = Decimal::ZERO;
        assert!(bad.validate().is_err());

        let mut bad = tool(Band::Middle, Comparator::Above);
        bad.price = ConditionObject::BaseVolume;
        assert!(bad.validate().is_err());

        assert_eq!(tool(Band::Middle, Comparator::Above).candles_required(), 8);
    }
}
