//! Bot configuration snapshots and where they come from.
//!
//! ```toml
//! [bot]
//! cycle_delay_secs = 60
//! max_concurrent_streams = 4
//!
//! [pairs."BTC/USDT"]
//! interval_secs = 300
//! strategies = ["dip buyer"]
//!
//! [[strategy]]
//! name = "dip buyer"
//! # ...
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;

use serde::Deserialize;
use tracing::debug;

use common::{BotSettings, Error, Pair, PairSettings, Result};
use strategy::{StrategyConfig, StrategyRegistry};

/// One immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub bot: BotSettings,
    #[serde(default)]
    pub pairs: BTreeMap<Pair, PairSettings>,
    #[serde(default, rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

impl Settings {
    pub fn from_toml(src: &str) -> Result<Self> {
        toml::from_str(src).map_err(|e| Error::Toml(e.to_string()))
    }

    /// Validate everything and build the strategy prototypes.
    pub fn validate(&self) -> Result<StrategyRegistry> {
        self.bot.validate()?;
        let registry = StrategyRegistry::from_config(&self.strategies)?;
        for (pair, settings) in &self.pairs {
            settings
                .validate()
                .map_err(|e| Error::config(format!("pair {pair}: {e}")))?;
            if let Some(unknown) = settings.strategies.iter().find(|s| !registry.contains(s)) {
                return Err(Error::config(format!(
                    "pair {pair} references unknown strategy '{unknown}'"
                )));
            }
        }
        Ok(registry)
    }
}

/// Supplies configuration snapshots and reports when they change.
pub trait SettingsSource: Send + Sync {
    fn current(&self) -> Result<Settings>;

    /// True once per change since the previous call.
    fn changed(&self) -> bool;
}

/// Settings read from a TOML file, changed when its modification time moves.
pub struct FileSettings {
    path: PathBuf,
    seen: Mutex<Option<SystemTime>>,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seen = Mutex::new(modified(&path));
        Self { path, seen }
    }
}

fn modified(path: &PathBuf) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl SettingsSource for FileSettings {
    fn current(&self) -> Result<Settings> {
        let src = std::fs::read_to_string(&self.path)?;
        Settings::from_toml(&src)
    }

    fn changed(&self) -> bool {
        let now = modified(&self.path);
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if now != *seen {
            debug!(path = %self.path.display(), "Configuration file changed");
            *seen = now;
            true
        } else {
            false
        }
    }
}

/// In-process settings that can be swapped at runtime.
pub struct StaticSettings {
    inner: Mutex<(Settings, bool)>,
}

impl StaticSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Mutex::new((settings, false)),
        }
    }

    /// Replace the snapshot and flag a change.
    pub fn replace(&self, settings: Settings) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = (settings, true);
    }
}

impl SettingsSource for StaticSettings {
    fn current(&self) -> Result<Settings> {
        Ok(self.inner.lock().unwrap_or_else(|e| e.into_inner()).0.clone())
    }

    fn changed(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut inner.1, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [bot]
        cycle_delay_secs = 1
        max_concurrent_streams = 2

        [pairs."btc/usdt"]
        strategies = ["watch"]

        [[strategy]]
        name = "watch"
        sequence = "up"

        [strategy.tools.up]
        type = "change"
        object = { source = "last" }
        shift = { kind = "percent", value = 5 }
        comparator = "above"

        [[strategy.outcomes]]
        type = "telegram"
        messages = ["{pair} is up"]
    "#;

    #[test]
    fn parses_and_validates() {
        let settings = Settings::from_toml(SAMPLE).unwrap();
        assert_eq!(settings.bot.cycle_delay_secs, 1);
        assert_eq!(settings.bot.cycles_kept, 20);
        let pair = Pair::new("BTC", "USDT");
        assert_eq!(settings.pairs[&pair].interval_secs, 300);
        let registry = settings.validate().unwrap();
        assert!(registry.contains("watch"));
    }

    #[test]
    fn unknown_strategy_reference_is_rejected() {
        let src = SAMPLE.replace(r#"strategies = ["watch"]"#, r#"strategies = ["nope"]"#);
        let settings = Settings::from_toml(&src).unwrap();
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn malformed_pair_key_fails_to_parse() {
        let src = SAMPLE.replace(r#"[pairs."btc/usdt"]"#, r#"[pairs."btcusdt"]"#);
        assert!(Settings::from_toml(&src).is_err());
    }

    #[test]
    fn shipped_sample_configuration_is_valid() {
        let settings = Settings::from_toml(include_str!("../../../config/bot.toml")).unwrap();
        let registry = settings.validate().unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn static_settings_report_each_change_once() {
        let source = StaticSettings::new(Settings::from_toml(SAMPLE).unwrap());
        assert!(!source.changed());
        let mut next = source.current().unwrap();
        next.bot.cycle_delay_secs = 30;
        source.replace(next);
        assert!(source.changed());
        assert!(!source.changed());
        assert_eq!(source.current().unwrap().bot.cycle_delay_secs, 30);
    }

    #[test]
    fn file_settings_read_from_disk() {
        let path = std::env::temp_dir().join(format!("cyclebot-settings-{}.toml", std::process::id()));
        std::fs::write(&path, SAMPLE).unwrap();
        let source = FileSettings::new(&path);
        assert!(!source.changed());
        assert_eq!(source.current().unwrap().strategies.len(), 1);
        std::fs::remove_file(&path).unwrap();
        assert!(source.changed());
        assert!(source.current().is_err());
    }
}
