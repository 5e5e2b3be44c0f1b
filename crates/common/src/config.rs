use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Process configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram; the bot is disabled when no token is set
    pub telegram_token: Option<String>,
    pub telegram_allowed_user_ids: Vec<i64>,

    // Database
    pub database_url: String,

    // Bot configuration file path
    pub bot_config_path: String,

    // Starting balances of the paper exchange
    pub paper_balances: HashMap<String, Decimal>,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let telegram_allowed_user_ids = optional_env("TELEGRAM_ALLOWED_USER_IDS")
            .map(|ids| parse_user_ids(&ids))
            .transpose()?
            .unwrap_or_default();

        let paper_balances = optional_env("PAPER_BALANCES")
            .map(|b| parse_balances(&b))
            .transpose()?
            .unwrap_or_default();

        Ok(Config {
            telegram_token: optional_env("TELEGRAM_TOKEN").filter(|t| !t.is_empty()),
            telegram_allowed_user_ids,
            database_url: required_env("DATABASE_URL")?,
            bot_config_path: optional_env("BOT_CONFIG_PATH")
                .unwrap_or_else(|| "config/bot.toml".to_string()),
            paper_balances,
        })
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::config(format!(
            "required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_user_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                Error::config(format!(
                    "TELEGRAM_ALLOWED_USER_IDS contains non-numeric ID: '{s}'"
                ))
            })
        })
        .collect()
}

/// Parse `USDT=1000,BTC=0.5` into a balance map.
fn parse_balances(raw: &str) -> Result<HashMap<String, Decimal>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (asset, amount) = entry
                .split_once('=')
                .ok_or_else(|| Error::config(format!("PAPER_BALANCES entry '{entry}' lacks '='")))?;
            let amount = amount.trim().parse::<Decimal>().map_err(|e| {
                Error::config(format!("PAPER_BALANCES amount for '{asset}': {e}"))
            })?;
            Ok((asset.trim().to_uppercase(), amount))
        })
        .collect()
}

/// Bot-wide settings, the `[bot]` table of the bot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    /// Pause between cycles.
    pub cycle_delay_secs: u64,
    /// Maximum number of pair cycles in flight at once.
    pub max_concurrent_streams: usize,
    /// Extra attempts for side tasks that report failure.
    pub side_task_retries: usize,
    /// Cycle records kept per pair.
    pub cycles_kept: usize,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            cycle_delay_secs: 60,
            max_concurrent_streams: 4,
            side_task_retries: 3,
            cycles_kept: 20,
        }
    }
}

impl BotSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_streams == 0 {
            return Err(Error::config("bot.max_concurrent_streams must be positive"));
        }
        if self.cycles_kept == 0 {
            return Err(Error::config("bot.cycles_kept must be positive"));
        }
        Ok(())
    }
}

/// Per-pair settings, one `[pairs."BASE/COUNTER"]` table each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSettings {
    /// Candle interval used by every strategy of the pair.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Strategy names, evaluated in this order.
    pub strategies: Vec<String>,
    /// Cancel open orders that outlive `open_order_lifespan_secs`.
    #[serde(default)]
    pub cancel_open_orders: bool,
    #[serde(default = "default_lifespan")]
    pub open_order_lifespan_secs: u64,
    /// Order history look-back for the average buy price.
    #[serde(default = "default_history_days")]
    pub history_days: u32,
}

fn default_interval() -> u64 {
    300
}

fn default_lifespan() -> u64 {
    3600
}

fn default_history_days() -> u32 {
    30
}

impl PairSettings {
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(Error::config("interval_secs must be positive"));
        }
        if self.strategies.is_empty() {
            return Err(Error::config("a pair needs at least one strategy"));
        }
        if self.cancel_open_orders && self.open_order_lifespan_secs == 0 {
            return Err(Error::config(
                "open_order_lifespan_secs must be positive when cancellation is enabled",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_balance_list() {
        let balances = parse_balances("usdt=1000, BTC=0.5").unwrap();
        assert_eq!(balances["USDT"], dec!(1000));
        assert_eq!(balances["BTC"], dec!(0.5));
        assert!(parse_balances("USDT").is_err());
        assert!(parse_balances("USDT=abc").is_err());
    }

    #[test]
    fn parses_user_ids() {
        assert_eq!(parse_user_ids("1, 2,3").unwrap(), vec![1, 2, 3]);
        assert!(parse_user_ids("1,x").is_err());
    }

    #[test]
    fn pair_settings_defaults_apply() {
        let settings: PairSettings = toml::from_str(r#"strategies = ["a"]"#).unwrap();
        assert_eq!(settings.interval_secs, 300);
        assert!(!settings.cancel_open_orders);
        assert_eq!(settings.history_days, 30);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn bot_settings_reject_zero_concurrency() {
        let settings = BotSettings {
            max_concurrent_streams: 0,
            ..BotSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
