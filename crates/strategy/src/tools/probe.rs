//! Scriptable tool for exercising sequences and strategies in tests.

use serde_json::json;

use common::{Error, Result};

use super::{Condition, Evaluation, Tool, ToolKind};
use crate::MarketData;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Probe {
    /// Results returned on successive evaluations, repeating the last one.
    pub results: Vec<bool>,
    pub candles: usize,
    pub fail: bool,
    pub panic: bool,
    pub calls: usize,
}

impl Probe {
    pub fn met(met: bool) -> Self {
        Self {
            results: vec![met],
            ..Self::default()
        }
    }

    pub fn with_candles(candles: usize) -> Self {
        Self {
            candles,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::default()
        }
    }
}

impl Condition for Probe {
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn evaluate(&mut self, _data: &MarketData) -> Result<Evaluation> {
        self.calls += 1;
        if self.panic {
            panic!("probe exploded");
        }
        if self.fail {
            return Err(Error::data("probe failure"));
        }
        let idx = (self.calls - 1).min(self.results.len().saturating_sub(1));
        let met = self.results.get(idx).copied().unwrap_or(false);
        Ok(Evaluation::new(met, json!({ "calls": self.calls })))
    }

    fn candles_required(&self) -> usize {
        self.candles
    }

    fn reset(&mut self) {
        self.calls = 0;
    }
}

pub fn tool(id: &str, probe: Probe) -> Tool {
    Tool::new(id, ToolKind::Probe(probe)).unwrap()
}

/// Number of evaluations a probe tool has seen.
pub fn calls(tool: &Tool) -> usize {
    match tool.kind() {
        ToolKind::Probe(p) => p.calls,
        _ => 0,
    }
}
