//! Building blocks shared by every tool: value sources, comparators,
//! baseline shifts, differences and level bounds.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use common::{Candle, Error, Result};

use crate::indicators::ma;
use crate::MarketData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandleField {
    Open,
    High,
    Low,
    #[default]
    Close,
}

impl CandleField {
    pub fn of(self, candle: &Candle) -> Decimal {
        match self {
            CandleField::Open => candle.open,
            CandleField::High => candle.high,
            CandleField::Low => candle.low,
            CandleField::Close => candle.close,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaKind {
    Simple,
    Exponential,
    Weighted,
}

/// Coarse grouping of condition sources, used by tools to whitelist inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCategory {
    TickerPrice,
    TickerStat,
    Candle,
    MovingAverage,
}

/// Where a tool reads a number from.
///
/// ```toml
/// object = { source = "ask" }
/// object = { source = "candle", field = "high", offset = 1 }
/// object = { source = "moving_average", kind = "exponential", period = 20 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ConditionObject {
    Last,
    Ask,
    Bid,
    ChangePercent,
    BaseVolume,
    CounterVolume,
    Candle {
        #[serde(default)]
        field: CandleField,
        #[serde(default)]
        offset: usize,
    },
    MovingAverage {
        kind: MaKind,
        period: usize,
        #[serde(default)]
        field: CandleField,
        #[serde(default)]
        offset: usize,
    },
}

impl ConditionObject {
    pub fn category(&self) -> SourceCategory {
        match self {
            ConditionObject::Last | ConditionObject::Ask | ConditionObject::Bid => {
                SourceCategory::TickerPrice
            }
            ConditionObject::ChangePercent
            | ConditionObject::BaseVolume
            | ConditionObject::CounterVolume => SourceCategory::TickerStat,
            ConditionObject::Candle { .. } => SourceCategory::Candle,
            ConditionObject::MovingAverage { .. } => SourceCategory::MovingAverage,
        }
    }

    /// Reject sources outside `allowed` and malformed moving averages.
    pub fn validate(&self, allowed: &[SourceCategory]) -> Result<()> {
        let category = self.category();
        if !allowed.contains(&category) {
            return Err(Error::config(format!(
                "condition source {category:?} is not accepted here (allowed: {allowed:?})"
            )));
        }
        if let ConditionObject::MovingAverage { period, .. } = self {
            if *period == 0 {
                return Err(Error::config("moving average period must be positive"));
            }
        }
        Ok(())
    }

    pub fn candles_required(&self) -> usize {
        match self {
            ConditionObject::Candle { offset, .. } => offset + 1,
            ConditionObject::MovingAverage {
                kind,
                period,
                offset,
                ..
            } => ma::candles_required(*kind, *period) + offset,
            _ => 0,
        }
    }

    pub fn resolve(&self, data: &MarketData) -> Result<Decimal> {
        self.resolve_at(data, 0)
    }

    /// Resolve with candle-based sources shifted `back` more candles into
    /// the past. Ticker sources ignore `back`.
    pub fn resolve_at(&self, data: &MarketData, back: usize) -> Result<Decimal> {
        let ticker = &data.ticker;
        let value = match self {
            ConditionObject::Last => ticker.last,
            ConditionObject::Ask => ticker.ask,
            ConditionObject::Bid => ticker.bid,
            ConditionObject::ChangePercent => ticker.change_percent,
            ConditionObject::BaseVolume => ticker.base_volume,
            ConditionObject::CounterVolume => ticker.counter_volume,
            ConditionObject::Candle { field, offset } => field.of(data.candle(offset + back)?),
            ConditionObject::MovingAverage {
                kind,
                period,
                field,
                offset,
            } => {
                let values = data.field_values(*field, offset + back);
                ma::moving_average(*kind, &values, *period).ok_or_else(|| {
                    Error::data(format!(
                        "{kind:?} moving average of {period} needs more than {} candles",
                        values.len()
                    ))
                })?
            }
        };

        if value <= Decimal::ZERO {
            return Err(Error::data(format!(
                "{self:?} resolved to non-positive value {value}"
            )));
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    #[serde(alias = "eq")]
    Equal,
    #[serde(alias = "gt")]
    Above,
    #[serde(alias = "gte")]
    AboveOrEqual,
    #[serde(alias = "lt")]
    Below,
    #[serde(alias = "lte")]
    BelowOrEqual,
    #[serde(alias = "ne")]
    AboveOrBelow,
}

impl Comparator {
    /// Whether `value` stands in this relation to `target`.
    pub fn compare(self, value: Decimal, target: Decimal) -> bool {
        match self {
            Comparator::Equal => value == target,
            Comparator::Above => value > target,
            Comparator::AboveOrEqual => value >= target,
            Comparator::Below => value < target,
            Comparator::BelowOrEqual => value <= target,
            Comparator::AboveOrBelow => value != target,
        }
    }
}

/// Moves a baseline: `{ kind = "percent", value = -2.5 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Shift {
    Units(Decimal),
    Percent(Decimal),
    /// Replaces the baseline altogether.
    Fixed(Decimal),
}

impl Default for Shift {
    fn default() -> Self {
        Shift::Units(Decimal::ZERO)
    }
}

impl Shift {
    pub fn apply(self, base: Decimal) -> Decimal {
        match self {
            Shift::Units(units) => base + units,
            Shift::Percent(pct) => base + base * pct / Decimal::ONE_HUNDRED,
            Shift::Fixed(value) => value,
        }
    }

    pub fn value(self) -> Decimal {
        match self {
            Shift::Units(v) | Shift::Percent(v) | Shift::Fixed(v) => v,
        }
    }

    pub fn is_fixed(self) -> bool {
        matches!(self, Shift::Fixed(_))
    }

    pub fn validate(self, allow_fixed: bool) -> Result<()> {
        match self {
            Shift::Fixed(_) if !allow_fixed => {
                Err(Error::config("a fixed shift is not allowed here"))
            }
            Shift::Fixed(v) if v <= Decimal::ZERO => {
                Err(Error::config(format!("fixed shift {v} must be positive")))
            }
            Shift::Percent(v) if v <= -Decimal::ONE_HUNDRED => Err(Error::config(format!(
                "percent shift {v} would make the baseline non-positive"
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difference {
    Units,
    Percent,
}

impl Difference {
    /// Change from `from` to `to`, in units or as a percentage of `from`.
    pub fn between(self, from: Decimal, to: Decimal) -> Result<Decimal> {
        let delta = to - from;
        match self {
            Difference::Units => Ok(delta),
            Difference::Percent => {
                if from.is_zero() {
                    return Err(Error::data("percent difference from zero"));
                }
                Ok(delta / from * Decimal::ONE_HUNDRED)
            }
        }
    }
}

/// Range a configured threshold must lie strictly inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub min: Decimal,
    pub max: Decimal,
    pub max_inclusive: bool,
}

impl Level {
    /// `(0, 100]`, the range of bounded oscillators.
    pub fn percent() -> Self {
        Self {
            min: Decimal::ZERO,
            max: Decimal::ONE_HUNDRED,
            max_inclusive: true,
        }
    }

    /// `(-100, 100)`, the range of a difference of two percent oscillators.
    pub fn signed_percent() -> Self {
        Self {
            min: -Decimal::ONE_HUNDRED,
            max: Decimal::ONE_HUNDRED,
            max_inclusive: false,
        }
    }

    pub fn check(&self, name: &str, value: Decimal) -> Result<()> {
        let below_max = if self.max_inclusive {
            value <= self.max
        } else {
            value < self.max
        };
        if value > self.min && below_max {
            Ok(())
        } else {
            Err(Error::config(format!(
                "{name} {value} must lie within ({}, {}{}",
                self.min,
                self.max,
                if self.max_inclusive { "]" } else { ")" }
            )))
        }
    }
}
