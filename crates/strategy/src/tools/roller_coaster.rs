use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::{Error, Result};

use super::{Condition, Evaluation};
use crate::conditions::{ConditionObject, Shift, SourceCategory};
use crate::MarketData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extreme {
    Highest,
    Lowest,
}

/// Trails the highest (or lowest) value seen and holds once the value
/// retraces from it by `shift`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollerCoaster {
    pub object: ConditionObject,
    pub extreme: Extreme,
    pub shift: Shift,
    #[serde(skip)]
    tracked: Option<Decimal>,
}

impl RollerCoaster {
    pub fn new(object: ConditionObject, extreme: Extreme, shift: Shift) -> Self {
        Self {
            object,
            extreme,
            shift,
            tracked: None,
        }
    }
}

impl Condition for RollerCoaster {
    fn validate(&self) -> Result<()> {
        self.object.validate(&[
            SourceCategory::TickerPrice,
            SourceCategory::TickerStat,
            SourceCategory::Candle,
            SourceCategory::MovingAverage,
        ])?;
        self.shift.validate(false)?;

        // the shift must point back from the extreme
        let value = self.shift.value();
        match self.extreme {
            Extreme::Highest if value > Decimal::ZERO => Err(Error::config(
                "a positive shift never triggers when tracking the highest value",
            )),
            Extreme::Lowest if value < Decimal::ZERO => Err(Error::config(
                "a negative shift never triggers when tracking the lowest value",
            )),
            _ => Ok(()),
        }
    }

    fn evaluate(&mut self, data: &MarketData) -> Result<Evaluation> {
        let current = self.object.resolve(data)?;
        let tracked = match (self.tracked, self.extreme) {
            (None, _) => current,
            (Some(t), Extreme::Highest) => t.max(current),
            (Some(t), Extreme::Lowest) => t.min(current),
        };
        self.tracked = Some(tracked);

        let trigger = self.shift.apply(tracked);
        let met = match self.extreme {
            Extreme::Highest => current <= trigger,
            Extreme::Lowest => current >= trigger,
        };
        Ok(Evaluation::new(
            met,
            json!({ "current": current, "extreme": tracked, "trigger": trigger }),
        ))
    }

    fn candles_required(&self) -> usize {
        self.object.candles_required()
    }

    fn reset(&mut self) {
        self.tracked = None;
    }
}
