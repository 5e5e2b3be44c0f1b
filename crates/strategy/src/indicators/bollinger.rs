/// Bollinger bands: SMA(period) ± deviation × population standard deviation.
#[derive(Debug, Clone)]
pub struct BollingerIndicator {
    pub period: usize,
    pub deviation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerIndicator {
    pub fn new(period: usize, deviation: f64) -> Self {
        Self { period, deviation }
    }

    pub fn candles_required(&self) -> usize {
        self.period
    }

    pub fn compute(&self, closes: &[f64]) -> Option<BollingerBands> {
        if self.period == 0 || closes.len() < self.period {
            return None;
        }
        let window = &closes[closes.len() - self.period..];
        let n = self.period as f64;
        let middle = window.iter().sum::<f64>() / n;
        let variance = window.iter().map(|v| (v - middle).powi(2)).sum::<f64>() / n;
        let width = variance.sqrt() * self.deviation;

        Some(BollingerBands {
            upper: middle + width,
            middle,
            lower: middle - width,
        })
    }
}
