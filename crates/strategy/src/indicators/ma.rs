use rust_decimal::Decimal;

use crate::conditions::MaKind;

/// Candles a moving average of `period` needs. The exponential average is
/// seeded with a simple average and then smoothed over a second period.
pub fn candles_required(kind: MaKind, period: usize) -> usize {
    match kind {
        MaKind::Simple | MaKind::Weighted => period,
        MaKind::Exponential => period * 2,
    }
}

/// Moving average of the newest values in `values` (oldest first).
/// Returns `None` if there isn't enough data.
pub fn moving_average(kind: MaKind, values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < candles_required(kind, period) {
        return None;
    }
    match kind {
        MaKind::Simple => Some(sma(&values[values.len() - period..])),
        MaKind::Weighted => Some(wma(&values[values.len() - period..])),
        MaKind::Exponential => Some(ema(&values[values.len() - period * 2..], period)),
    }
}

fn sma(window: &[Decimal]) -> Decimal {
    window.iter().sum::<Decimal>() / Decimal::from(window.len())
}

/// Linearly weighted; the newest value weighs `period`, the oldest 1.
fn wma(window: &[Decimal]) -> Decimal {
    let (weighted, weights) = window
        .iter()
        .enumerate()
        .fold((Decimal::ZERO, Decimal::ZERO), |(sum, total), (i, v)| {
            let w = Decimal::from(i + 1);
            (sum + *v * w, total + w)
        });
    weighted / weights
}

fn ema(window: &[Decimal], period: usize) -> Decimal {
    let k = Decimal::TWO / Decimal::from(period + 1);
    let (seed, rest) = window.split_at(period);
    rest.iter()
        .fold(sma(seed), |prev, price| *price * k + prev * (Decimal::ONE - k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn simple_average_of_newest_values() {
        let values = [dec!(1), dec!(2), dec!(3), dec!(4)];
        assert_eq!(moving_average(MaKind::Simple, &values, 2), Some(dec!(3.5)));
    }

    #[test]
    fn weighted_average_favours_newest() {
        let values = [dec!(1), dec!(2), dec!(3)];
        // (1*1 + 2*2 + 3*3) / 6
        assert_eq!(
            moving_average(MaKind::Weighted, &values, 3),
            Some(dec!(14) / dec!(6))
        );
    }

    #[test]
    fn exponential_average_of_constant_series_is_constant() {
        let values = [dec!(5); 8];
        assert_eq!(moving_average(MaKind::Exponential, &values, 4), Some(dec!(5)));
    }

    #[test]
    fn insufficient_data() {
        let values = [dec!(1), dec!(2), dec!(3)];
        assert_eq!(moving_average(MaKind::Simple, &values, 4), None);
        assert_eq!(moving_average(MaKind::Exponential, &values, 2), None);
        assert_eq!(moving_average(MaKind::Simple, &values, 0), None);
    }
}
