use std::collections::BTreeMap;

use tracing::info;

use common::{Error, Result};

use crate::{Strategy, StrategyConfig};

/// Validated strategy prototypes, keyed by name. Streams receive clones.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    prototypes: BTreeMap<String, Strategy>,
}

impl StrategyRegistry {
    /// Build every configured strategy. Any invalid one fails the whole set.
    pub fn from_config(configs: &[StrategyConfig]) -> Result<Self> {
        let mut prototypes = BTreeMap::new();
        for config in configs {
            let strategy = config.build()?;
            info!(
                strategy = %strategy.name(),
                mode = ?strategy.mode(),
                candles = strategy.candles_required(),
                "Registered strategy"
            );
            if prototypes.insert(config.name.clone(), strategy).is_some() {
                return Err(Error::config(format!(
                    "strategy '{}' is defined twice",
                    config.name
                )));
            }
        }
        Ok(Self { prototypes })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.prototypes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.prototypes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    /// Fresh, independent copies of the named strategies, in order.
    pub fn instantiate(&self, names: &[String]) -> Result<Vec<Strategy>> {
        names
            .iter()
            .map(|name| {
                self.prototypes
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::config(format!("unknown strategy '{name}'")))
            })
            .collect()
    }
}
