/// Stochastic oscillator.
///
/// Raw %K = (close − lowest low) / (highest high − lowest low) × 100 over
/// `period` candles, %K = SMA(raw %K, smooth_k), %D = SMA(%K, smooth_d).
#[derive(Debug, Clone)]
pub struct StochIndicator {
    pub period: usize,
    pub smooth_k: usize,
    pub smooth_d: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochValue {
    pub k: f64,
    pub d: f64,
}

impl StochIndicator {
    pub fn new(period: usize, smooth_k: usize, smooth_d: usize) -> Self {
        Self {
            period,
            smooth_k,
            smooth_d,
        }
    }

    pub fn candles_required(&self) -> usize {
        (self.period + self.smooth_k + self.smooth_d).saturating_sub(2)
    }

    /// Slices are oldest first and of equal length.
    pub fn compute(&self, highs: &[f64], lows: &[f64], closes: &[f64]) -> Option<StochValue> {
        if self.period == 0 || self.smooth_k == 0 || self.smooth_d == 0 {
            return None;
        }
        let len = closes.len();
        if highs.len() != len || lows.len() != len || len < self.candles_required() {
            return None;
        }

        let raw_k: Vec<f64> = (self.period - 1..len)
            .map(|i| {
                let from = i + 1 - self.period;
                let highest = highs[from..=i].iter().copied().fold(f64::MIN, f64::max);
                let lowest = lows[from..=i].iter().copied().fold(f64::MAX, f64::min);
                let range = highest - lowest;
                if range == 0.0 {
                    50.0
                } else {
                    (closes[i] - lowest) / range * 100.0
                }
            })
            .collect();

        let k_line = sma_series(&raw_k, self.smooth_k);
        let d_line = sma_series(&k_line, self.smooth_d);

        Some(StochValue {
            k: *k_line.last()?,
            d: *d_line.last()?,
        })
    }
}

fn sma_series(data: &[f64], period: usize) -> Vec<f64> {
    data.windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_at_the_high_reads_100() {
        let stoch = StochIndicator::new(5, 1, 1);
        let highs: Vec<f64> = (0..5).map(|i| 10.0 + i as f64).collect();
        let lows: Vec<f64> = (0..5).map(|i| 5.0 + i as f64).collect();
        let closes = highs.clone();
        let value = stoch.compute(&highs, &lows, &closes).unwrap();
        assert!((value.k - 100.0).abs() < 1e-9);
        assert!((value.d - 100.0).abs() < 1e-9);
    }

    #[test]
    fn closing_at_the_low_reads_0() {
        let stoch = StochIndicator::new(3, 2, 2);
        let highs = vec![10.0; 6];
        let lows = vec![5.0; 6];
        let closes = vec![5.0; 6];
        let value = stoch.compute(&highs, &lows, &closes).unwrap();
        assert!(value.k.abs() < 1e-9);
    }

    #[test]
    fn needs_period_plus_smoothing() {
        let stoch = StochIndicator::new(3, 2, 2);
        assert_eq!(stoch.candles_required(), 5);
        let v = vec![1.0; 4];
        assert!(stoch.compute(&v, &v, &v).is_none());
    }
}
