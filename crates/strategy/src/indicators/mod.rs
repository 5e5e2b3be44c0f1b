//! Numeric calculators behind the oscillator and band tools.
//!
//! Moving averages work on `Decimal` directly; the remaining calculators
//! work on `f64` and their results are converted back at the tool boundary.

pub mod bollinger;
pub mod ma;
pub mod macd;
pub mod rsi;
pub mod stoch;

pub use bollinger::{BollingerBands, BollingerIndicator};
pub use macd::{MacdIndicator, MacdValue};
pub use rsi::RsiIndicator;
pub use stoch::{StochIndicator, StochValue};

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use common::{Error, Result};

pub(crate) fn to_f64s(values: &[Decimal]) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.to_f64()
                .ok_or_else(|| Error::data(format!("{v} does not fit an f64")))
        })
        .collect()
}

pub(crate) fn to_decimal(value: f64) -> Result<Decimal> {
    Decimal::from_f64(value).ok_or_else(|| Error::data(format!("indicator produced {value}")))
}
