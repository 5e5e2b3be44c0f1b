//! Actions a satisfied strategy performs.
//!
//! ```toml
//! [[strategy.outcomes]]
//! type = "dca"
//! amount = { kind = "percent", value = 25 }
//! max_repeats = 3
//! ```

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use common::{Error, RejectionReason, Result};

use crate::StrategyMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Buy(BuyOutcome),
    /// Sells the whole base balance at the bid.
    Sell,
    Dca(DcaOutcome),
    Telegram(TelegramOutcome),
    /// Does nothing; useful for watching a sequence.
    Sandbox,
}

impl Outcome {
    pub fn type_name(&self) -> &'static str {
        match self {
            Outcome::Buy(_) => "buy",
            Outcome::Sell => "sell",
            Outcome::Dca(_) => "dca",
            Outcome::Telegram(_) => "telegram",
            Outcome::Sandbox => "sandbox",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Outcome::Buy(buy) => buy.amount.validate(),
            Outcome::Dca(dca) => {
                dca.amount.validate()?;
                if dca.max_repeats == Some(0) {
                    return Err(Error::config("dca max_repeats must be positive"));
                }
                Ok(())
            }
            Outcome::Telegram(telegram) => {
                if telegram.messages.iter().all(|m| m.trim().is_empty()) {
                    return Err(Error::config("telegram outcome needs at least one message"));
                }
                Ok(())
            }
            Outcome::Sell | Outcome::Sandbox => Ok(()),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Outcome::Dca(dca) => dca.repeats = 0,
            Outcome::Telegram(telegram) => telegram.next = 0,
            _ => {}
        }
    }

    /// Buy, sell and DCA place exchange orders.
    pub fn places_order(&self) -> bool {
        matches!(self, Outcome::Buy(_) | Outcome::Sell | Outcome::Dca(_))
    }
}

/// Validate multiplicity and exclusivity, then derive the strategy mode.
pub fn classify(outcomes: &[Outcome]) -> Result<StrategyMode> {
    if outcomes.is_empty() {
        return Err(Error::config("a strategy needs at least one outcome"));
    }

    let count = |name: &str| outcomes.iter().filter(|o| o.type_name() == name).count();
    for name in ["buy", "sell", "dca", "telegram"] {
        if count(name) > 1 {
            return Err(Error::config(format!("more than one '{name}' outcome")));
        }
    }
    if count("sandbox") > 0 && outcomes.len() > 1 {
        return Err(Error::config("sandbox outcome cannot be combined with others"));
    }
    if outcomes.iter().filter(|o| o.places_order()).count() > 1 {
        return Err(Error::config(
            "buy, sell and dca outcomes are mutually exclusive",
        ));
    }

    let mode = if count("buy") > 0 {
        StrategyMode::Buy
    } else if count("sell") > 0 || count("dca") > 0 {
        StrategyMode::Sell
    } else {
        StrategyMode::Any
    };
    Ok(mode)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyOutcome {
    pub amount: Amount,
}

/// Buys more while holding a position, optionally a limited number of times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaOutcome {
    pub amount: Amount,
    #[serde(default)]
    pub max_repeats: Option<u32>,
    #[serde(skip)]
    pub repeats: u32,
}

impl DcaOutcome {
    pub fn exhausted(&self) -> bool {
        self.max_repeats.is_some_and(|max| self.repeats >= max)
    }

    /// Called once an order placed by this outcome is confirmed filled.
    pub fn record_repeat(&mut self) {
        self.repeats += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramOutcome {
    pub messages: Vec<String>,
    /// Pick messages at random instead of rotating through them.
    #[serde(default)]
    pub random: bool,
    #[serde(skip)]
    pub next: usize,
}

impl TelegramOutcome {
    /// The next message with `{pair}` and `{strategy}` filled in.
    pub fn next_message(&mut self, pair: &str, strategy: &str) -> String {
        if self.messages.is_empty() {
            return String::new();
        }
        let index = if self.random {
            rand::thread_rng().gen_range(0..self.messages.len())
        } else {
            let index = self.next % self.messages.len();
            self.next = index + 1;
            index
        };
        self.messages[index]
            .replace("{pair}", pair)
            .replace("{strategy}", strategy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountKind {
    /// Percentage of the counter-asset balance.
    Percent,
    /// Units of the base asset.
    Base,
    /// Units of the counter asset.
    Counter,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub kind: AmountKind,
    pub value: Decimal,
}

impl Amount {
    pub fn validate(&self) -> Result<()> {
        if self.value <= Decimal::ZERO {
            return Err(Error::config("amount must be positive"));
        }
        if self.kind == AmountKind::Percent && self.value > Decimal::ONE_HUNDRED {
            return Err(Error::config("percent amount must be in (0, 100]"));
        }
        Ok(())
    }

    /// Base-asset amount to buy at `rate` given the counter balance.
    pub fn resolve(&self, counter_balance: Decimal, rate: Decimal) -> Result<Decimal> {
        if rate <= Decimal::ZERO {
            return Err(Error::data(format!("invalid rate {rate}")));
        }
        let amount = match self.kind {
            AmountKind::Percent => counter_balance * self.value / Decimal::ONE_HUNDRED / rate,
            AmountKind::Base => self.value,
            AmountKind::Counter => self.value / rate,
        };
        if amount * rate > counter_balance {
            return Err(Error::rejected(RejectionReason::InsufficientBalance));
        }
        Ok(amount)
    }
}
