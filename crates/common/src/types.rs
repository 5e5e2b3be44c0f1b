use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A tradable base/counter asset combination, written `BASE/COUNTER`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair {
    pub base: String,
    pub counter: String,
}

impl Pair {
    pub fn new(base: impl Into<String>, counter: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            counter: counter.into().to_uppercase(),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.counter)
    }
}

impl FromStr for Pair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((base, counter)) if !base.trim().is_empty() && !counter.trim().is_empty() => {
                Ok(Pair::new(base.trim(), counter.trim()))
            }
            _ => Err(Error::config(format!(
                "invalid pair '{s}', expected BASE/COUNTER"
            ))),
        }
    }
}

impl TryFrom<String> for Pair {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.to_string()
    }
}

/// Exchange-confirmed trading limits of a pair.
///
/// A zero maximum means the exchange imposes no upper bound; a zero step
/// means values are not rounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPair {
    pub pair: Pair,
    pub precision: u32,
    pub min_rate: Decimal,
    pub max_rate: Decimal,
    pub rate_step: Decimal,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub amount_step: Decimal,
    pub min_value: Decimal,
}

impl AssetPair {
    /// Limits that accept any positive rate and amount.
    pub fn unbounded(pair: Pair) -> Self {
        Self {
            pair,
            precision: 8,
            min_rate: Decimal::ZERO,
            max_rate: Decimal::ZERO,
            rate_step: Decimal::ZERO,
            min_amount: Decimal::ZERO,
            max_amount: Decimal::ZERO,
            amount_step: Decimal::ZERO,
            min_value: Decimal::ZERO,
        }
    }

    /// Validate an order's rate and amount against the pair limits and round
    /// both down to their steps.
    pub fn transaction(&self, rate: Decimal, amount: Decimal) -> Result<(Decimal, Decimal)> {
        check_bounds("rate", rate, self.min_rate, self.max_rate)?;
        check_bounds("amount", amount, self.min_amount, self.max_amount)?;

        let rate = round_to_step(rate, self.rate_step)
            .round_dp_with_strategy(self.precision, RoundingStrategy::ToZero);
        let amount = round_to_step(amount, self.amount_step);

        // rounding down can leave the bounds
        check_bounds("rounded rate", rate, self.min_rate, self.max_rate)?;
        check_bounds("rounded amount", amount, self.min_amount, self.max_amount)?;

        let value = rate * amount;
        if value < self.min_value {
            return Err(Error::rejected(RejectionReason::OutsideBounds(format!(
                "order value {value} is below minimum {}",
                self.min_value
            ))));
        }

        Ok((rate, amount))
    }
}

fn check_bounds(what: &str, value: Decimal, min: Decimal, max: Decimal) -> Result<()> {
    if value <= Decimal::ZERO || value < min || (max > Decimal::ZERO && value > max) {
        return Err(Error::rejected(RejectionReason::OutsideBounds(format!(
            "{what} {value} outside [{min}, {max}]"
        ))));
    }
    Ok(())
}

fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).floor() * step
}

/// Latest ticker of a pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub last: Decimal,
    pub ask: Decimal,
    pub bid: Decimal,
    /// 24h price change in percent.
    pub change_percent: Decimal,
    pub base_volume: Decimal,
    pub counter_volume: Decimal,
}

/// One OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Available balance per asset code.
pub type Balances = HashMap<String, Decimal>;

/// Balance of `asset`, zero when the exchange did not report it.
pub fn balance_of(balances: &Balances, asset: &str) -> Decimal {
    balances.get(asset).copied().unwrap_or(Decimal::ZERO)
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
}

/// A limit order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub pair: Pair,
    pub side: OrderSide,
    pub rate: Decimal,
    pub amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    /// Name of the strategy that placed the order, when placed by the bot.
    #[serde(default)]
    pub strategy: Option<String>,
}

impl Order {
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }
}

/// Exchange-wide request cooldown (rate limiting).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CooldownInfo {
    pub active: bool,
    pub until: Option<DateTime<Utc>>,
}

/// What a tool reported on its last evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSnapshot {
    pub met: bool,
    pub data: serde_json::Value,
}

/// A strategy's last evaluation with every tool's individual snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySnapshot {
    pub name: String,
    pub met: bool,
    pub sequence: String,
    /// `None` when the tool's last evaluation failed or never happened.
    pub tools: BTreeMap<String, Option<ToolSnapshot>>,
}

/// Structured result of one successful stream cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleResult {
    Strategies { strategies: Vec<StrategySnapshot> },
    OpenOrders { open: usize, cancelled: usize },
}

/// Persisted record of one pair's cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCycle {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub success: bool,
    pub result: Option<CycleResult>,
    pub error: Option<String>,
}

impl PairCycle {
    pub fn succeeded(started_at: DateTime<Utc>, result: CycleResult) -> Self {
        Self {
            started_at,
            ended_at: Utc::now(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(started_at: DateTime<Utc>, error: &Error) -> Self {
        Self {
            started_at,
            ended_at: Utc::now(),
            success: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

/// Reason an order placement was refused before or by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Another order placed by the stream is still unconfirmed.
    OrderCollision,
    OutsideBounds(String),
    InsufficientBalance,
    Other(String),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::OrderCollision => write!(f, "an unconfirmed order is outstanding"),
            RejectionReason::OutsideBounds(s) => write!(f, "outside pair bounds: {s}"),
            RejectionReason::InsufficientBalance => write!(f, "insufficient balance"),
            RejectionReason::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Current state of the workflow controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Idle,
    Running,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Running => write!(f, "running"),
        }
    }
}

/// Optional work performed alongside a start/stop transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SideTasks {
    pub cancel_open_orders: bool,
    pub sell_all: bool,
}

impl SideTasks {
    pub fn any(&self) -> bool {
        self.cancel_open_orders || self.sell_all
    }
}

/// Broadcast to observers after every operator-driven transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub state: EngineState,
    pub side_tasks: SideTasks,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn stepped_pair() -> AssetPair {
        AssetPair {
            pair: Pair::new("btc", "usdt"),
            precision: 8,
            min_rate: dec!(1),
            max_rate: dec!(100),
            rate_step: dec!(0.05),
            min_amount: dec!(0.1),
            max_amount: dec!(1000),
            amount_step: dec!(0.1),
            min_value: dec!(5),
        }
    }

    #[test]
    fn pair_parses_and_displays() {
        let pair: Pair = "btc/usdt".parse().unwrap();
        assert_eq!(pair, Pair::new("BTC", "USDT"));
        assert_eq!(pair.to_string(), "BTC/USDT");
        assert!("BTCUSDT".parse::<Pair>().is_err());
        assert!("/USDT".parse::<Pair>().is_err());
    }

    #[test]
    fn transaction_rounds_down_to_steps() {
        let (rate, amount) = stepped_pair()
            .transaction(dec!(10.12345), dec!(11.298))
            .unwrap();
        assert_eq!(rate, dec!(10.10));
        assert_eq!(amount, dec!(11.20));
    }

    #[test]
    fn transaction_rejects_out_of_bounds() {
        let pair = stepped_pair();
        assert!(pair.transaction(dec!(0.5), dec!(10)).is_err());
        assert!(pair.transaction(dec!(101), dec!(10)).is_err());
        assert!(pair.transaction(dec!(10), dec!(0.05)).is_err());
        assert!(pair.transaction(dec!(10), dec!(1001)).is_err());
        // value 2 * 1 = 2 < 5
        assert!(pair.transaction(dec!(2), dec!(1)).is_err());
    }

    #[test]
    fn transaction_rechecks_bounds_after_rounding() {
        let pair = AssetPair {
            min_amount: dec!(0.15),
            min_value: Decimal::ZERO,
            ..stepped_pair()
        };
        // 0.19 rounds down to 0.1, under the 0.15 minimum
        assert!(matches!(
            pair.transaction(dec!(10), dec!(0.19)),
            Err(Error::OrderRejected { .. })
        ));
        assert_eq!(
            pair.transaction(dec!(10), dec!(0.21)).unwrap(),
            (dec!(10.00), dec!(0.2))
        );

        let pair = AssetPair {
            min_rate: dec!(1.02),
            ..stepped_pair()
        };
        // 1.04 rounds down to 1.00, under the 1.02 minimum
        assert!(pair.transaction(dec!(1.04), dec!(10)).is_err());
    }

    #[test]
    fn unbounded_pair_only_rejects_non_positive() {
        let pair = AssetPair::unbounded(Pair::new("ETH", "USDT"));
        assert_eq!(
            pair.transaction(dec!(1.23456), dec!(7.891)).unwrap(),
            (dec!(1.23456), dec!(7.891))
        );
        assert!(pair.transaction(Decimal::ZERO, dec!(1)).is_err());
        assert!(pair.transaction(dec!(1), dec!(-1)).is_err());
    }

    #[test]
    fn cycle_result_serializes_with_kind_tag() {
        let json = serde_json::to_value(CycleResult::OpenOrders {
            open: 2,
            cancelled: 1,
        })
        .unwrap();
        assert_eq!(json["kind"], "open_orders");
        assert_eq!(json["open"], 2);
    }
}
