use rust_decimal::Decimal;

use common::{Candle, Error, Result, Ticker};

use crate::conditions::CandleField;

/// Everything a strategy may look at during one cycle of a stream.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub ticker: Ticker,
    /// Oldest first; offset 0 is the newest candle.
    pub candles: Vec<Candle>,
    /// Average buy price of the held base asset; zero when unknown.
    pub avg_buy_price: Decimal,
}

impl MarketData {
    /// The candle `offset` places back from the newest one.
    pub fn candle(&self, offset: usize) -> Result<&Candle> {
        self.candles
            .len()
            .checked_sub(offset + 1)
            .map(|idx| &self.candles[idx])
            .ok_or_else(|| {
                Error::data(format!(
                    "candle at offset {offset} requested, only {} available",
                    self.candles.len()
                ))
            })
    }

    /// `field` of every candle up to `offset` places back, oldest first.
    pub fn field_values(&self, field: CandleField, offset: usize) -> Vec<Decimal> {
        let end = self.candles.len().saturating_sub(offset);
        self.candles[..end].iter().map(|c| field.of(c)).collect()
    }
}
