use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::{Error, Result};

use super::{Condition, Evaluation};
use crate::conditions::{CandleField, Comparator, Level};
use crate::indicators::{
    to_decimal, to_f64s, MacdIndicator, RsiIndicator, StochIndicator,
};
use crate::MarketData;

fn insufficient(name: &str, need: usize, have: usize) -> Error {
    Error::data(format!("{name} needs {need} candles, got {have}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacdLine {
    Macd,
    Signal,
    /// MACD line minus signal line.
    Histogram,
}

/// Compares a MACD reading against `level`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
    #[serde(default)]
    pub field: CandleField,
    pub line: MacdLine,
    pub comparator: Comparator,
    pub level: Decimal,
}

impl Macd {
    fn indicator(&self) -> MacdIndicator {
        MacdIndicator::new(self.fast, self.slow, self.signal)
    }
}

impl Condition for Macd {
    fn validate(&self) -> Result<()> {
        if self.fast == 0 || self.signal == 0 {
            return Err(Error::config("MACD periods must be positive"));
        }
        if self.fast >= self.slow {
            return Err(Error::config(format!(
                "MACD fast period {} must be less than slow period {}",
                self.fast, self.slow
            )));
        }
        Ok(())
    }

    fn evaluate(&mut self, data: &MarketData) -> Result<Evaluation> {
        let indicator = self.indicator();
        let closes = to_f64s(&data.field_values(self.field, 0))?;
        let value = indicator
            .compute(&closes)
            .ok_or_else(|| insufficient("MACD", indicator.candles_required(), closes.len()))?;

        let reading = to_decimal(match self.line {
            MacdLine::Macd => value.macd,
            MacdLine::Signal => value.signal,
            MacdLine::Histogram => value.histogram,
        })?;
        let met = self.comparator.compare(reading, self.level);
        Ok(Evaluation::new(
            met,
            json!({
                "macd": value.macd,
                "signal": value.signal,
                "histogram": value.histogram,
                "level": self.level,
            }),
        ))
    }

    fn candles_required(&self) -> usize {
        self.indicator().candles_required()
    }
}

/// Compares RSI against `level` in (0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rsi {
    pub period: usize,
    #[serde(default)]
    pub field: CandleField,
    pub comparator: Comparator,
    pub level: Decimal,
}

impl Condition for Rsi {
    fn validate(&self) -> Result<()> {
        if self.period < 2 {
            return Err(Error::config("RSI period must be >= 2"));
        }
        Level::percent().check("RSI level", self.level)
    }

    fn evaluate(&mut self, data: &MarketData) -> Result<Evaluation> {
        let indicator = RsiIndicator::new(self.period);
        let closes = to_f64s(&data.field_values(self.field, 0))?;
        let rsi = indicator
            .compute(&closes)
            .ok_or_else(|| insufficient("RSI", indicator.candles_required(), closes.len()))?;

        let met = self.comparator.compare(to_decimal(rsi)?, self.level);
        Ok(Evaluation::new(
            met,
            json!({ "rsi": rsi, "level": self.level }),
        ))
    }

    fn candles_required(&self) -> usize {
        RsiIndicator::new(self.period).candles_required()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StochLine {
    K,
    D,
    /// %K minus %D.
    Delta,
}

/// Compares a stochastic oscillator reading against `level`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stoch {
    pub period: usize,
    pub smooth_k: usize,
    pub smooth_d: usize,
    pub line: StochLine,
    pub comparator: Comparator,
    pub level: Decimal,
}

impl Stoch {
    fn indicator(&self) -> StochIndicator {
        StochIndicator::new(self.period, self.smooth_k, self.smooth_d)
    }
}

impl Condition for Stoch {
    fn validate(&self) -> Result<()> {
        if self.period == 0 || self.smooth_k == 0 || self.smooth_d == 0 {
            return Err(Error::config("stochastic periods must be positive"));
        }
        match self.line {
            StochLine::K | StochLine::D => Level::percent().check("stoch level", self.level),
            StochLine::Delta => Level::signed_percent().check("stoch delta level", self.level),
        }
    }

    fn evaluate(&mut self, data: &MarketData) -> Result<Evaluation> {
        let indicator = self.indicator();
        let highs = to_f64s(&data.field_values(CandleField::High, 0))?;
        let lows = to_f64s(&data.field_values(CandleField::Low, 0))?;
        let closes = to_f64s(&data.field_values(CandleField::Close, 0))?;
        let value = indicator
            .compute(&highs, &lows, &closes)
            .ok_or_else(|| insufficient("stochastic", indicator.candles_required(), closes.len()))?;

        let reading = to_decimal(match self.line {
            StochLine::K => value.k,
            StochLine::D => value.d,
            StochLine::Delta => value.k - value.d,
        })?;
        let met = self.comparator.compare(reading, self.level);
        Ok(Evaluation::new(
            met,
            json!({ "k": value.k, "d": value.d, "level": self.level }),
        ))
    }

    fn candles_required(&self) -> usize {
        self.indicator().candles_required()
    }
}
