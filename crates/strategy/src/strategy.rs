use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use common::{Error, Result, StrategySnapshot};

use crate::outcomes::{classify, Outcome};
use crate::{MarketData, Sequence, StrategyMode, Tool};

/// One parsed sequence bound to its outcomes.
///
/// Cloning deep-copies every tool and outcome, so each stream evaluates an
/// independent instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    name: String,
    sequence_text: String,
    sequence: Sequence,
    outcomes: Vec<Outcome>,
    candles_required: usize,
    mode: StrategyMode,
    last_met: bool,
}

impl Strategy {
    pub fn new(
        name: impl Into<String>,
        sequence_text: impl Into<String>,
        tools: Vec<Tool>,
        outcomes: Vec<Outcome>,
    ) -> Result<Self> {
        let name = name.into();
        let sequence_text = sequence_text.into();
        if name.trim().is_empty() {
            return Err(Error::config("strategy name must not be empty"));
        }

        let mut table = HashMap::with_capacity(tools.len());
        for tool in tools {
            let id = tool.id().to_string();
            if table.insert(id.clone(), tool).is_some() {
                return Err(Error::config(format!(
                    "strategy '{name}': tool '{id}' is declared twice"
                )));
            }
        }

        let sequence = Sequence::parse(&sequence_text, table).map_err(|e| match e {
            Error::Config(msg) => Error::config(format!("strategy '{name}': {msg}")),
            other => other,
        })?;

        for outcome in &outcomes {
            outcome.validate()?;
        }
        let mode = classify(&outcomes)
            .map_err(|e| Error::config(format!("strategy '{name}': {e}")))?;

        Ok(Self {
            candles_required: sequence.candles_required(),
            name,
            sequence_text,
            sequence,
            outcomes,
            mode,
            last_met: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sequence_text(&self) -> &str {
        &self.sequence_text
    }

    pub fn mode(&self) -> StrategyMode {
        self.mode
    }

    pub fn candles_required(&self) -> usize {
        self.candles_required
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn outcomes_mut(&mut self) -> &mut [Outcome] {
        &mut self.outcomes
    }

    /// Evaluate the sequence. A panicking tool is reported as an error.
    pub fn evaluate(&mut self, data: &MarketData) -> Result<bool> {
        let sequence = &mut self.sequence;
        let result = catch_unwind(AssertUnwindSafe(|| sequence.evaluate(data)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(strategy = %self.name, %message, "Tool panicked during evaluation");
                Err(Error::Panic(message))
            });

        self.last_met = matches!(result, Ok(true));
        result
    }

    /// Reset tool state, and outcome state too when `include_outcomes`.
    pub fn reset(&mut self, include_outcomes: bool) {
        self.sequence.reset();
        if include_outcomes {
            for outcome in &mut self.outcomes {
                outcome.reset();
            }
        }
    }

    /// Count a confirmed DCA fill.
    pub fn confirm_dca(&mut self) {
        for outcome in &mut self.outcomes {
            if let Outcome::Dca(dca) = outcome {
                dca.record_repeat();
            }
        }
    }

    pub fn snapshot(&self) -> StrategySnapshot {
        let tools: BTreeMap<_, _> = self
            .sequence
            .tools()
            .into_iter()
            .map(|tool| (tool.id().to_string(), tool.snapshot().cloned()))
            .collect();
        StrategySnapshot {
            name: self.name.clone(),
            met: self.last_met,
            sequence: self.sequence_text.clone(),
            tools,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::market;
    use crate::tools::probe::{tool, Probe};
    use crate::ToolKind;
    use rust_decimal_macros::dec;

    fn sandbox(sequence: &str, tools: Vec<Tool>) -> Result<Strategy> {
        Strategy::new("s", sequence, tools, vec![Outcome::Sandbox])
    }

    #[test]
    fn spot_check_end_to_end() {
        let test1: ToolKind = toml::from_str(
            r#"
            type = "change"
            object = { source = "ask" }
            shift = { kind = "fixed", value = 80 }
            comparator = "equal"
            "#,
        )
        .unwrap();
        let test2: ToolKind = toml::from_str(
            r#"
            type = "buy_price"
            price = { source = "last" }
            shift = { kind = "units", value = 2 }
            comparator = "above"
            "#,
        )
        .unwrap();
        let mut strategy = Strategy::new(
            "spot",
            "test1 and test2",
            vec![
                Tool::new("test1", test1).unwrap(),
                Tool::new("test2", test2).unwrap(),
            ],
            vec![Outcome::Sell],
        )
        .unwrap();
        assert_eq!(strategy.mode(), StrategyMode::Sell);

        let mut first = market(dec!(12.5), dec!(30), dec!(29));
        first.avg_buy_price = dec!(10);
        assert!(!strategy.evaluate(&first).unwrap());
        assert!(!strategy.snapshot().met);

        let mut second = market(dec!(12.5), dec!(80), dec!(79));
        second.avg_buy_price = dec!(10);
        assert!(strategy.evaluate(&second).unwrap());

        let snapshot = strategy.snapshot();
        assert!(snapshot.met);
        assert_eq!(snapshot.sequence, "test1 and test2");
        assert!(snapshot.tools["test1"].as_ref().unwrap().met);
        assert!(snapshot.tools["test2"].as_ref().unwrap().met);
    }

    #[test]
    fn panics_become_errors() {
        let mut strategy = sandbox("a", vec![tool("a", Probe::panicking())]).unwrap();
        let err = strategy
            .evaluate(&market(dec!(1), dec!(1), dec!(1)))
            .unwrap_err();
        assert!(matches!(err, Error::Panic(msg) if msg.contains("probe exploded")));
    }

    #[test]
    fn reset_keeps_outcomes_unless_asked() {
        let dca: Outcome = toml::from_str(
            r#"
            type = "dca"
            amount = { kind = "base", value = 1 }
            max_repeats = 1
            "#,
        )
        .unwrap();
        let mut strategy =
            Strategy::new("d", "a", vec![tool("a", Probe::met(true))], vec![dca]).unwrap();
        strategy.confirm_dca();

        strategy.reset(false);
        assert!(matches!(&strategy.outcomes()[0], Outcome::Dca(d) if d.exhausted()));
        strategy.reset(true);
        assert!(matches!(&strategy.outcomes()[0], Outcome::Dca(d) if !d.exhausted()));
    }

    #[test]
    fn clones_do_not_share_state() {
        let original = sandbox("a", vec![tool("a", Probe::met(true))]).unwrap();
        let mut copy = original.clone();
        assert!(copy.evaluate(&market(dec!(1), dec!(1), dec!(1))).unwrap());
        assert!(copy.snapshot().tools["a"].is_some());
        assert!(original.snapshot().tools["a"].is_none());
    }

    #[test]
    fn construction_errors() {
        assert!(sandbox("a", vec![tool("a", Probe::default()), tool("a", Probe::default())]).is_err());
        assert!(sandbox("a", vec![tool("a", Probe::default()), tool("b", Probe::default())]).is_err());
        assert!(Strategy::new("x", "a", vec![tool("a", Probe::default())], vec![]).is_err());
        assert!(Strategy::new(" ", "a", vec![tool("a", Probe::default())], vec![Outcome::Sandbox]).is_err());
    }

    #[test]
    fn candle_requirement_follows_sequence() {
        let strategy = sandbox(
            "a or b",
            vec![tool("a", Probe::with_candles(5)), tool("b", Probe::with_candles(9))],
        )
        .unwrap();
        assert_eq!(strategy.candles_required(), 9);
    }
}
