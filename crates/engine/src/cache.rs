use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use common::{Error, OrderSide, RejectionReason, Result};

/// Work to apply to the placing strategy once its order is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConfirm {
    /// Count one more DCA repeat.
    DcaRepeat,
}

/// An order the stream placed whose fill has not been verified yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconfirmedOrder {
    pub id: String,
    pub side: OrderSide,
    pub strategy: String,
    pub on_confirm: Option<OnConfirm>,
}

/// Per-stream order lifecycle: cancellation deadlines of open orders and
/// at most one unconfirmed order.
#[derive(Debug, Default)]
pub struct OrderCache {
    deadlines: HashMap<String, DateTime<Utc>>,
    unconfirmed: Option<UnconfirmedOrder>,
}

impl OrderCache {
    /// Deadline of an open order, assigning `now + lifespan` on first sight.
    pub fn deadline(&mut self, id: &str, now: DateTime<Utc>, lifespan: Duration) -> DateTime<Utc> {
        *self
            .deadlines
            .entry(id.to_string())
            .or_insert_with(|| now + lifespan)
    }

    pub fn forget(&mut self, id: &str) {
        self.deadlines.remove(id);
    }

    /// Drop deadlines of orders that are no longer open.
    pub fn prune<'a>(&mut self, open: impl IntoIterator<Item = &'a str>) {
        let open: HashSet<&str> = open.into_iter().collect();
        self.deadlines.retain(|id, _| open.contains(id.as_str()));
    }

    pub fn tracked(&self) -> usize {
        self.deadlines.len()
    }

    /// Fails with an order collision while an order awaits confirmation.
    pub fn ensure_free(&self) -> Result<()> {
        match self.unconfirmed {
            Some(_) => Err(Error::rejected(RejectionReason::OrderCollision)),
            None => Ok(()),
        }
    }

    pub fn set_unconfirmed(&mut self, order: UnconfirmedOrder) -> Result<()> {
        self.ensure_free()?;
        self.unconfirmed = Some(order);
        Ok(())
    }

    pub fn unconfirmed(&self) -> Option<&UnconfirmedOrder> {
        self.unconfirmed.as_ref()
    }

    pub fn clear_unconfirmed(&mut self) -> Option<UnconfirmedOrder> {
        self.unconfirmed.take()
    }
}
