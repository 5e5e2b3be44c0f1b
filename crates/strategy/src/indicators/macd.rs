/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// MACD line = EMA(fast) − EMA(slow), signal = EMA(macd line, signal period),
/// histogram = MACD line − signal.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// Latest MACD readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self { fast, slow, signal }
    }

    pub fn candles_required(&self) -> usize {
        self.slow + self.signal
    }

    /// Compute MACD from a slice of close prices (oldest first).
    /// Returns `None` if there isn't enough data.
    pub fn compute(&self, closes: &[f64]) -> Option<MacdValue> {
        if self.fast == 0 || self.fast >= self.slow || self.signal == 0 {
            return None;
        }
        if closes.len() < self.candles_required() {
            return None;
        }

        let fast = ema_series(closes, self.fast);
        let slow = ema_series(closes, self.slow);
        // Align both series on the newest value
        let skip = fast.len() - slow.len();
        let macd_line: Vec<f64> = slow
            .iter()
            .zip(&fast[skip..])
            .map(|(s, f)| f - s)
            .collect();

        let signal_line = ema_series(&macd_line, self.signal);
        let macd = *macd_line.last()?;
        let signal = *signal_line.last()?;

        Some(MacdValue {
            macd,
            signal,
            histogram: macd - signal,
        })
    }
}

/// EMA at every index from `period - 1` on, seeded with the SMA of the first
/// `period` values.
fn ema_series(data: &[f64], period: usize) -> Vec<f64> {
    if data.len() < period || period == 0 {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed = data[..period].iter().sum::<f64>() / period as f64;

    let mut series = Vec::with_capacity(data.len() - period + 1);
    series.push(seed);
    for &price in &data[period..] {
        let prev = series[series.len() - 1];
        series.push(price * k + prev * (1.0 - k));
    }
    series
}
