//! Fixtures shared by unit tests.

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use common::{Candle, Ticker};

use crate::MarketData;

pub fn market(last: Decimal, ask: Decimal, bid: Decimal) -> MarketData {
    MarketData {
        ticker: Ticker {
            last,
            ask,
            bid,
            change_percent: Decimal::ONE,
            base_volume: Decimal::ONE_HUNDRED,
            counter_volume: Decimal::ONE_THOUSAND,
        },
        candles: Vec::new(),
        avg_buy_price: Decimal::ZERO,
    }
}

/// Flat candles (open = high = low = close), oldest first.
pub fn candles(closes: &[Decimal]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            open_time: start + Duration::minutes(5 * i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ONE,
        })
        .collect()
}

pub fn ramp(from: i64, count: usize, step: i64) -> Vec<Decimal> {
    (0..count)
        .map(|i| Decimal::from(from + step * i as i64))
        .collect()
}
