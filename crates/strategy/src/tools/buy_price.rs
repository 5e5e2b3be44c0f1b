use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::Result;

use super::{Condition, Evaluation};
use crate::conditions::{Comparator, ConditionObject, Shift, SourceCategory};
use crate::MarketData;

/// Compares a ticker price against the stream's average buy price.
///
/// Without a known buy price there is nothing to compare against and the
/// condition holds trivially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyPrice {
    pub price: ConditionObject,
    #[serde(default)]
    pub shift: Shift,
    pub comparator: Comparator,
}

impl Condition for BuyPrice {
    fn validate(&self) -> Result<()> {
        self.price.validate(&[SourceCategory::TickerPrice])?;
        self.shift.validate(false)
    }

    fn evaluate(&mut self, data: &MarketData) -> Result<Evaluation> {
        if data.avg_buy_price <= Decimal::ZERO {
            return Ok(Evaluation::new(true, json!({ "buy_price": Decimal::ZERO })));
        }

        let current = self.price.resolve(data)?;
        let target = self.shift.apply(data.avg_buy_price);
        let met = self.comparator.compare(current, target);
        Ok(Evaluation::new(
            met,
            json!({
                "current": current,
                "buy_price": data.avg_buy_price,
                "target": target,
            }),
        ))
    }

    fn candles_required(&self) -> usize {
        0
    }
}
