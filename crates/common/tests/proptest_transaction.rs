use proptest::prelude::*;
use rust_decimal::Decimal;

use common::{AssetPair, Error, Pair};

fn stepped() -> AssetPair {
    AssetPair {
        rate_step: Decimal::new(1, 2),
        amount_step: Decimal::new(1, 3),
        // minimums that are not multiples of their steps
        min_rate: Decimal::new(1025, 3),
        min_amount: Decimal::new(15, 4),
        min_value: Decimal::ONE,
        ..AssetPair::unbounded(Pair::new("BTC", "USDT"))
    }
}

proptest! {
    /// Accepted orders are rounded down onto the steps and stay within limits.
    #[test]
    fn transaction_rounds_down_onto_steps(
        rate_cents in 1i64..10_000_000,
        amount_micros in 1i64..100_000_000,
    ) {
        let limits = stepped();
        let rate = Decimal::new(rate_cents, 2) + Decimal::new(7, 4);
        let amount = Decimal::new(amount_micros, 6);

        match limits.transaction(rate, amount) {
            Ok((r, a)) => {
                prop_assert!(r <= rate && a <= amount);
                prop_assert!(rate - r < limits.rate_step);
                prop_assert!(amount - a < limits.amount_step);
                prop_assert_eq!((r / limits.rate_step).fract(), Decimal::ZERO);
                prop_assert_eq!((a / limits.amount_step).fract(), Decimal::ZERO);
                prop_assert!(r * a >= limits.min_value);
                prop_assert!(r >= limits.min_rate && a >= limits.min_amount);
            }
            Err(e) => prop_assert!(matches!(e, Error::OrderRejected { .. }), "unexpected error {e}"),
        }
    }
}
