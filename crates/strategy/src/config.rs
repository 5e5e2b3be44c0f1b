use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use common::Result;

use crate::outcomes::Outcome;
use crate::{Strategy, Tool, ToolKind};

/// One `[[strategy]]` table of the bot configuration.
///
/// ```toml
/// [[strategy]]
/// name = "dip buyer"
/// sequence = "oversold and dip"
///
/// [strategy.tools.oversold]
/// type = "rsi"
/// period = 14
/// comparator = "below"
/// level = 30
///
/// [strategy.tools.dip]
/// type = "roller_coaster"
/// object = { source = "ask" }
/// extreme = "lowest"
/// shift = { kind = "percent", value = 1 }
///
/// [[strategy.outcomes]]
/// type = "buy"
/// amount = { kind = "percent", value = 20 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub sequence: String,
    #[serde(default)]
    pub tools: BTreeMap<String, ToolKind>,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

impl StrategyConfig {
    /// Validate every tool and outcome and parse the sequence.
    pub fn build(&self) -> Result<Strategy> {
        let tools = self
            .tools
            .iter()
            .map(|(id, kind)| Tool::new(id.clone(), kind.clone()))
            .collect::<Result<Vec<_>>>()?;
        Strategy::new(&self.name, &self.sequence, tools, self.outcomes.clone())
    }
}
