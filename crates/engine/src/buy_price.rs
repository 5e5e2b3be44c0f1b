use rust_decimal::Decimal;

use common::{Order, OrderSide};

/// Value-weighted average rate of the position currently held.
///
/// Walks `history` (newest first) over filled orders, collecting buys until
/// a sell is met or the collected amount reaches `base_balance`. The oldest
/// contributing buy only counts for the part that fits in the balance.
/// Zero when nothing contributes.
pub fn average_buy_price(history: &[Order], base_balance: Decimal) -> Decimal {
    let mut amount = Decimal::ZERO;
    let mut value = Decimal::ZERO;

    for order in history.iter().filter(|o| o.is_filled()) {
        if order.side == OrderSide::Sell {
            break;
        }
        let room = base_balance - amount;
        if room <= Decimal::ZERO {
            break;
        }
        let taken = order.amount.min(room);
        amount += taken;
        value += taken * order.rate;
        if taken < order.amount {
            break;
        }
    }

    if amount.is_zero() {
        Decimal::ZERO
    } else {
        value / amount
    }
}
