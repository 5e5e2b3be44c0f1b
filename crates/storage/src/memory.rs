use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use common::{Order, Pair, PairCycle, Result, Store};

#[derive(Default)]
struct PairRecords {
    cycles: VecDeque<PairCycle>,
    total_cycles: u64,
}

/// In-memory store for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryStore {
    pairs: RwLock<HashMap<Pair, PairRecords>>,
    orders: RwLock<Vec<Order>>,
    session_orders: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_pair_cycle(&self, pair: &Pair, cycle: &PairCycle, keep: usize) -> Result<()> {
        let mut pairs = self.pairs.write().await;
        let records = pairs.entry(pair.clone()).or_default();
        records.cycles.push_back(cycle.clone());
        while records.cycles.len() > keep {
            records.cycles.pop_front();
        }
        records.total_cycles += 1;
        Ok(())
    }

    async fn pair_cycles(&self, pair: &Pair) -> Result<Vec<PairCycle>> {
        Ok(self
            .pairs
            .read()
            .await
            .get(pair)
            .map(|r| r.cycles.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_pair_order(&self, pair: &Pair, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        let mut order = order.clone();
        order.pair = pair.clone();
        match orders.iter_mut().find(|o| o.id == order.id) {
            Some(existing) => *existing = order,
            None => orders.push(order),
        }
        Ok(())
    }

    async fn pair_orders(
        &self,
        pair: &Pair,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        Ok(self
            .orders(start, end)
            .await?
            .into_iter()
            .filter(|o| &o.pair == pair)
            .collect())
    }

    async fn orders(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| o.created_at >= start && o.created_at <= end)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn cycle_count(&self, pair: &Pair) -> Result<u64> {
        Ok(self
            .pairs
            .read()
            .await
            .get(pair)
            .map_or(0, |r| r.total_cycles))
    }

    fn session_orders(&self) -> u64 {
        self.session_orders.load(Ordering::SeqCst)
    }

    fn increment_session_orders(&self) {
        self.session_orders.fetch_add(1, Ordering::SeqCst);
    }

    fn reset_session_orders(&self) {
        self.session_orders.store(0, Ordering::SeqCst);
    }
}
