//! Condition tools: each evaluates one market condition to a boolean.
//!
//! Tools are configured from TOML tables tagged by `type`:
//!
//! ```toml
//! [strategy.tools.dip]
//! type = "roller_coaster"
//! object = { source = "bid" }
//! extreme = "highest"
//! shift = { kind = "percent", value = -3 }
//! ```

mod bollinger;
mod buy_price;
mod change;
mod ma_spread;
mod oscillators;
#[cfg(test)]
pub(crate) mod probe;
mod roller_coaster;
mod trailing;

pub use bollinger::{Band, Bollinger};
pub use buy_price::BuyPrice;
pub use change::Change;
pub use ma_spread::MaSpread;
pub use oscillators::{Macd, MacdLine, Rsi, Stoch, StochLine};
pub use roller_coaster::{Extreme, RollerCoaster};
pub use trailing::Trailing;

use serde::{Deserialize, Serialize};

use common::{Error, Result, ToolSnapshot};

use crate::MarketData;

/// Outcome of one evaluation: whether the condition holds plus
/// type-specific data for observability.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub met: bool,
    pub data: serde_json::Value,
}

impl Evaluation {
    pub fn new(met: bool, data: serde_json::Value) -> Self {
        Self { met, data }
    }
}

/// Capabilities every tool variant provides.
pub trait Condition {
    /// Check settings once, at strategy construction.
    fn validate(&self) -> Result<()>;

    fn evaluate(&mut self, data: &MarketData) -> Result<Evaluation>;

    /// Candles this tool needs, newest last.
    fn candles_required(&self) -> usize;

    /// Forget any condition state accumulated across evaluations.
    fn reset(&mut self) {}
}

/// All tool variants, keyed by their `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolKind {
    BuyPrice(BuyPrice),
    Change(Change),
    RollerCoaster(RollerCoaster),
    Macd(Macd),
    Rsi(Rsi),
    Stoch(Stoch),
    Trailing(Trailing),
    Bollinger(Bollinger),
    MaSpread(MaSpread),
    #[cfg(test)]
    #[serde(skip)]
    Probe(probe::Probe),
}

impl ToolKind {
    /// Type tags accepted in configuration.
    pub const TYPES: &'static [&'static str] = &[
        "buy_price",
        "change",
        "roller_coaster",
        "macd",
        "rsi",
        "stoch",
        "trailing",
        "bollinger",
        "ma_spread",
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            ToolKind::BuyPrice(_) => "buy_price",
            ToolKind::Change(_) => "change",
            ToolKind::RollerCoaster(_) => "roller_coaster",
            ToolKind::Macd(_) => "macd",
            ToolKind::Rsi(_) => "rsi",
            ToolKind::Stoch(_) => "stoch",
            ToolKind::Trailing(_) => "trailing",
            ToolKind::Bollinger(_) => "bollinger",
            ToolKind::MaSpread(_) => "ma_spread",
            #[cfg(test)]
            ToolKind::Probe(_) => "probe",
        }
    }

    fn condition(&self) -> &dyn Condition {
        match self {
            ToolKind::BuyPrice(t) => t,
            ToolKind::Change(t) => t,
            ToolKind::RollerCoaster(t) => t,
            ToolKind::Macd(t) => t,
            ToolKind::Rsi(t) => t,
            ToolKind::Stoch(t) => t,
            ToolKind::Trailing(t) => t,
            ToolKind::Bollinger(t) => t,
            ToolKind::MaSpread(t) => t,
            #[cfg(test)]
            ToolKind::Probe(t) => t,
        }
    }

    fn condition_mut(&mut self) -> &mut dyn Condition {
        match self {
            ToolKind::BuyPrice(t) => t,
            ToolKind::Change(t) => t,
            ToolKind::RollerCoaster(t) => t,
            ToolKind::Macd(t) => t,
            ToolKind::Rsi(t) => t,
            ToolKind::Stoch(t) => t,
            ToolKind::Trailing(t) => t,
            ToolKind::Bollinger(t) => t,
            ToolKind::MaSpread(t) => t,
            #[cfg(test)]
            ToolKind::Probe(t) => t,
        }
    }
}

impl Condition for ToolKind {
    fn validate(&self) -> Result<()> {
        self.condition().validate()
    }

    fn evaluate(&mut self, data: &MarketData) -> Result<Evaluation> {
        self.condition_mut().evaluate(data)
    }

    fn candles_required(&self) -> usize {
        self.condition().candles_required()
    }

    fn reset(&mut self) {
        self.condition_mut().reset()
    }
}

/// A configured tool instance, owned by exactly one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
    id: String,
    kind: ToolKind,
    snapshot: Option<ToolSnapshot>,
}

impl Tool {
    /// Validate the identifier and the tool settings.
    pub fn new(id: impl Into<String>, kind: ToolKind) -> Result<Self> {
        let id = id.into();
        validate_id(&id)?;
        kind.validate().map_err(|e| match e {
            Error::Config(msg) => {
                Error::config(format!("tool '{id}' ({}): {msg}", kind.type_name()))
            }
            other => other,
        })?;
        Ok(Self {
            id,
            kind,
            snapshot: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &ToolKind {
        &self.kind
    }

    /// Evaluate and record a snapshot; a failed evaluation clears it.
    pub fn evaluate(&mut self, data: &MarketData) -> Result<bool> {
        match self.kind.evaluate(data) {
            Ok(evaluation) => {
                self.snapshot = Some(ToolSnapshot {
                    met: evaluation.met,
                    data: evaluation.data,
                });
                Ok(evaluation.met)
            }
            Err(e) => {
                self.snapshot = None;
                Err(e)
            }
        }
    }

    pub fn candles_required(&self) -> usize {
        self.kind.candles_required()
    }

    /// Reset condition state. The last snapshot is kept for reporting.
    pub fn reset(&mut self) {
        self.kind.reset();
    }

    pub fn snapshot(&self) -> Option<&ToolSnapshot> {
        self.snapshot.as_ref()
    }
}

/// Identifiers are non-empty and limited to `[a-zA-Z0-9_./#+-]`.
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./#+-".contains(c));
    if valid {
        Ok(())
    } else {
        Err(Error::config(format!("invalid tool identifier '{id}'")))
    }
}
