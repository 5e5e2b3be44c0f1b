use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Order, Pair, PairCycle, Result};

/// Persistence of cycle records, orders and counters.
#[async_trait]
pub trait Store: Send + Sync {
    /// Append a cycle record, keeping only the most recent `keep` per pair.
    async fn save_pair_cycle(&self, pair: &Pair, cycle: &PairCycle, keep: usize) -> Result<()>;

    /// Cycle records of a pair, oldest first.
    async fn pair_cycles(&self, pair: &Pair) -> Result<Vec<PairCycle>>;

    async fn save_pair_order(&self, pair: &Pair, order: &Order) -> Result<()>;

    /// Orders of a pair created in `[start, end]`, oldest first.
    async fn pair_orders(
        &self,
        pair: &Pair,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>>;

    /// Orders of every pair created in `[start, end]`, oldest first.
    async fn orders(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>>;

    async fn order_count(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize> {
        Ok(self.orders(start, end).await?.len())
    }

    /// Number of cycle records ever saved for a pair.
    async fn cycle_count(&self, pair: &Pair) -> Result<u64>;

    /// Orders confirmed since the engine last started.
    fn session_orders(&self) -> u64;

    fn increment_session_orders(&self);

    fn reset_session_orders(&self);
}
