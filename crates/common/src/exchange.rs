use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{AssetPair, Balances, Candle, CooldownInfo, Order, Pair, Result, Ticker};

/// Abstraction over the exchange connection.
///
/// `PaperExchange` implements this for simulation. Errors carry an optional
/// HTTP-style status; `404` means the requested order no longer exists.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Whether the exchange is currently throttling requests.
    async fn cooldown_info(&self) -> Result<CooldownInfo>;

    /// Available balance per asset.
    async fn balances(&self) -> Result<Balances>;

    async fn ticker(&self, pair: &Pair) -> Result<Ticker>;

    /// Up to `limit` candles closing at or before `end`, oldest first.
    async fn candles(
        &self,
        pair: &Pair,
        interval_secs: u64,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    async fn open_orders(&self, pair: &Pair) -> Result<Vec<Order>>;

    async fn order(&self, pair: &Pair, id: &str) -> Result<Order>;

    /// Orders created in `[start, end]`, newest first.
    async fn order_history(
        &self,
        pair: &Pair,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>>;

    /// Place a limit buy and return the order id.
    async fn buy(&self, pair: &Pair, rate: Decimal, amount: Decimal) -> Result<String>;

    /// Place a limit sell and return the order id.
    async fn sell(&self, pair: &Pair, rate: Decimal, amount: Decimal) -> Result<String>;

    async fn cancel_order(&self, pair: &Pair, id: &str) -> Result<()>;

    /// Fetch trading limits for every pair, failing on unknown pairs.
    async fn confirm_pairs(&self, pairs: &[Pair]) -> Result<Vec<AssetPair>>;

    /// Fail when the exchange does not serve candles of this interval.
    async fn confirm_interval(&self, interval_secs: u64) -> Result<()>;
}
