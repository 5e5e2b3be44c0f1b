use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use common::{balance_of, AssetPair, ExchangeClient, Notifier, Pair, Result, SideTasks, Store};

use crate::stream::{CycleContext, Stream};

/// What one coordinated cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Skipped because the exchange was cooling down.
    pub skipped: bool,
    pub pairs: usize,
    pub failed: usize,
    /// A cooldown became active while the cycle ran.
    pub cooldown_after: bool,
}

/// Fans work out across pairs under a concurrency cap.
#[derive(Clone)]
pub struct Coordinator {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl Coordinator {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            exchange,
            store,
            notifier,
        }
    }

    /// Run one cycle of every stream, at most `max_concurrent` at a time.
    /// Returns once every admitted stream has finished.
    pub async fn run_cycle(
        &self,
        streams: &[Arc<Mutex<Stream>>],
        max_concurrent: usize,
        keep: usize,
    ) -> Result<CycleReport> {
        let cooldown = self.exchange.cooldown_info().await?;
        if cooldown.active {
            info!(until = ?cooldown.until, "Exchange cooldown active, skipping cycle");
            return Ok(CycleReport {
                skipped: true,
                ..CycleReport::default()
            });
        }

        let ctx = CycleContext {
            exchange: self.exchange.clone(),
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            balances: Arc::new(self.exchange.balances().await?),
            keep,
        };

        let results = fan_out(streams.iter().cloned(), max_concurrent, move |stream| {
            let ctx = ctx.clone();
            async move { stream.lock().await.cycle(&ctx).await.success }
        })
        .await;

        let report = CycleReport {
            skipped: false,
            pairs: streams.len(),
            failed: results.iter().filter(|ok| !**ok).count(),
            cooldown_after: self.exchange.cooldown_info().await?.active,
        };
        if report.cooldown_after {
            warn!("Exchange cooldown became active during the cycle");
        }
        info!(pairs = report.pairs, failed = report.failed, "Cycle complete");
        Ok(report)
    }

    /// Run the requested side tasks on every pair, retrying the whole batch
    /// up to `retries` more times while any pair reports failure.
    pub async fn run_side_tasks(
        &self,
        pairs: &[AssetPair],
        tasks: SideTasks,
        max_concurrent: usize,
        retries: usize,
    ) -> bool {
        if !tasks.any() {
            return true;
        }
        for attempt in 0..=retries {
            let exchange = self.exchange.clone();
            let balances = match exchange.balances().await {
                Ok(balances) => Arc::new(balances),
                Err(e) => {
                    warn!(attempt, error = %e, "Side tasks could not fetch balances");
                    continue;
                }
            };
            let results = fan_out(pairs.iter().cloned(), max_concurrent, move |pair| {
                let exchange = exchange.clone();
                let balances = balances.clone();
                async move {
                    let mut ok = true;
                    if tasks.cancel_open_orders {
                        ok &= cancel_open_orders(exchange.as_ref(), &pair.pair).await;
                    }
                    if tasks.sell_all {
                        let base = balance_of(&balances, &pair.pair.base);
                        ok &= sell_all(exchange.as_ref(), &pair, base).await;
                    }
                    ok
                }
            })
            .await;

            if results.iter().all(|ok| *ok) {
                info!(?tasks, attempt, "Side tasks complete");
                return true;
            }
            warn!(?tasks, attempt, "Side tasks reported failures");
        }
        error!(?tasks, "Side tasks failed after retries");
        false
    }
}

/// Run `work` for every item, at most `limit` at a time, and wait for all.
/// A panicked unit counts as a failure.
async fn fan_out<T, F, Fut>(items: impl Iterator<Item = T>, limit: usize, work: F) -> Vec<bool>
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = bool> + Send + 'static,
{
    let gate = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();
    for item in items {
        let gate = gate.clone();
        let unit = work(item);
        set.spawn(async move {
            // The semaphore is never closed.
            let _permit = gate.acquire_owned().await.ok();
            unit.await
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = set.join_next().await {
        results.push(joined.unwrap_or_else(|e| {
            error!(error = %e, "Pair task panicked");
            false
        }));
    }
    results
}

async fn cancel_open_orders(exchange: &dyn ExchangeClient, pair: &Pair) -> bool {
    let orders = match exchange.open_orders(pair).await {
        Ok(orders) => orders,
        Err(e) => {
            warn!(%pair, error = %e, "Could not list open orders");
            return false;
        }
    };
    let mut ok = true;
    for order in orders {
        match exchange.cancel_order(pair, &order.id).await {
            Ok(()) => info!(%pair, id = %order.id, "Cancelled open order"),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(%pair, id = %order.id, error = %e, "Cancel failed");
                ok = false;
            }
        }
    }
    ok
}

async fn sell_all(exchange: &dyn ExchangeClient, pair: &AssetPair, base: Decimal) -> bool {
    if base.is_zero() {
        return true;
    }
    let result: Result<Option<String>> = async {
        let ticker = exchange.ticker(&pair.pair).await?;
        if ticker.bid * base < pair.min_value {
            return Ok(None);
        }
        let (rate, amount) = pair.transaction(ticker.bid, base)?;
        exchange.sell(&pair.pair, rate, amount).await.map(Some)
    }
    .await;

    match result {
        Ok(Some(id)) => {
            info!(pair = %pair.pair, %id, "Sold base balance");
            true
        }
        Ok(None) => true,
        Err(e) => {
            warn!(pair = %pair.pair, error = %e, "Sell-all failed");
            false
        }
    }
}
