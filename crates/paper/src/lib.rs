use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    AssetPair, Balances, Candle, CooldownInfo, Error, ExchangeClient, Order, OrderSide,
    OrderStatus, Pair, Result, Ticker,
};

const SUPPORTED_INTERVALS: &[u64] = &[60, 300, 900, 1800, 3600, 14_400, 86_400];

#[derive(Default)]
struct Book {
    balances: Balances,
    tickers: HashMap<Pair, Ticker>,
    candles: HashMap<Pair, Vec<Candle>>,
    limits: HashMap<Pair, AssetPair>,
    orders: HashMap<String, Order>,
    cooldown: CooldownInfo,
    offline: bool,
}

/// Simulated exchange for paper trading and tests.
///
/// Market data is pushed in by the caller. Orders fill immediately at their
/// limit rate unless auto-fill is turned off, in which case they stay open
/// until [`PaperExchange::fill_order`] is called.
pub struct PaperExchange {
    book: Arc<RwLock<Book>>,
    auto_fill: Arc<RwLock<bool>>,
    /// Artificial delay applied to ticker requests.
    latency: Arc<RwLock<Option<Duration>>>,
    order_requests: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl PaperExchange {
    pub fn new(balances: Balances) -> Self {
        info!(assets = balances.len(), "PaperExchange initialized");
        Self {
            book: Arc::new(RwLock::new(Book {
                balances,
                ..Book::default()
            })),
            auto_fill: Arc::new(RwLock::new(true)),
            latency: Arc::new(RwLock::new(None)),
            order_requests: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub async fn set_ticker(&self, pair: &Pair, ticker: Ticker) {
        self.book.write().await.tickers.insert(pair.clone(), ticker);
    }

    pub async fn set_candles(&self, pair: &Pair, candles: Vec<Candle>) {
        self.book.write().await.candles.insert(pair.clone(), candles);
    }

    pub async fn set_balance(&self, asset: &str, amount: Decimal) {
        self.book
            .write()
            .await
            .balances
            .insert(asset.to_uppercase(), amount);
    }

    pub async fn set_limits(&self, limits: AssetPair) {
        self.book
            .write()
            .await
            .limits
            .insert(limits.pair.clone(), limits);
    }

    pub async fn set_cooldown(&self, cooldown: CooldownInfo) {
        self.book.write().await.cooldown = cooldown;
    }

    /// Make `ping` fail, as an unreachable exchange would.
    pub async fn set_offline(&self, offline: bool) {
        self.book.write().await.offline = offline;
    }

    pub async fn set_auto_fill(&self, auto_fill: bool) {
        *self.auto_fill.write().await = auto_fill;
    }

    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    /// Seed an order, e.g. history from before the bot started.
    pub async fn insert_order(&self, order: Order) {
        self.book.write().await.orders.insert(order.id.clone(), order);
    }

    /// Fill an open order and settle balances.
    pub async fn fill_order(&self, id: &str) -> Result<()> {
        let mut book = self.book.write().await;
        let order = book
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("order {id} not found")))?;
        if order.status != OrderStatus::Open {
            return Err(Error::exchange(Some(400), format!("order {id} is not open")));
        }
        settle(&mut book.balances, &order)?;
        if let Some(stored) = book.orders.get_mut(id) {
            stored.status = OrderStatus::Filled;
        }
        Ok(())
    }

    /// Drop an order entirely, as if the exchange forgot it.
    pub async fn forget_order(&self, id: &str) {
        self.book.write().await.orders.remove(id);
    }

    pub async fn balance(&self, asset: &str) -> Decimal {
        common::balance_of(&self.book.read().await.balances, asset)
    }

    /// Buy, sell and cancel requests received so far.
    pub fn order_requests(&self) -> usize {
        self.order_requests.load(Ordering::SeqCst)
    }

    /// Highest number of ticker requests served concurrently.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn place(&self, pair: &Pair, side: OrderSide, rate: Decimal, amount: Decimal) -> Result<String> {
        self.order_requests.fetch_add(1, Ordering::SeqCst);
        if rate <= Decimal::ZERO || amount <= Decimal::ZERO {
            return Err(Error::exchange(
                Some(400),
                format!("invalid order {amount} @ {rate}"),
            ));
        }

        let auto_fill = *self.auto_fill.read().await;
        let mut book = self.book.write().await;
        let mut order = Order {
            id: uuid::Uuid::new_v4().to_string(),
            pair: pair.clone(),
            side,
            rate,
            amount,
            status: OrderStatus::Open,
            created_at: Utc::now(),
            strategy: None,
        };
        if auto_fill {
            settle(&mut book.balances, &order)?;
            order.status = OrderStatus::Filled;
        }

        debug!(%pair, %side, %rate, %amount, status = ?order.status, "Paper order placed");
        let id = order.id.clone();
        book.orders.insert(id.clone(), order);
        Ok(id)
    }
}

/// Move funds for a fill, rejecting it when the paying side is short.
fn settle(balances: &mut Balances, order: &Order) -> Result<()> {
    let value = order.rate * order.amount;
    let (pay_asset, pay, get_asset, get) = match order.side {
        OrderSide::Buy => (&order.pair.counter, value, &order.pair.base, order.amount),
        OrderSide::Sell => (&order.pair.base, order.amount, &order.pair.counter, value),
    };
    let available = common::balance_of(balances, pay_asset);
    if available < pay {
        return Err(Error::exchange(
            Some(400),
            format!("insufficient {pay_asset}: need {pay}, have {available}"),
        ));
    }
    balances.insert(pay_asset.clone(), available - pay);
    *balances.entry(get_asset.clone()).or_insert(Decimal::ZERO) += get;
    Ok(())
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn ping(&self) -> Result<()> {
        if self.book.read().await.offline {
            return Err(Error::exchange(Some(503), "exchange unreachable"));
        }
        Ok(())
    }

    async fn cooldown_info(&self) -> Result<CooldownInfo> {
        Ok(self.book.read().await.cooldown.clone())
    }

    async fn balances(&self) -> Result<Balances> {
        Ok(self.book.read().await.balances.clone())
    }

    async fn ticker(&self, pair: &Pair) -> Result<Ticker> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let ticker = self.book.read().await.tickers.get(pair).cloned();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        ticker.ok_or_else(|| Error::exchange(None, format!("no ticker for {pair}")))
    }

    async fn candles(
        &self,
        pair: &Pair,
        _interval_secs: u64,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let book = self.book.read().await;
        let candles: Vec<Candle> = book
            .candles
            .get(pair)
            .map(|all| all.iter().filter(|c| c.open_time <= end).cloned().collect())
            .unwrap_or_default();
        let skip = candles.len().saturating_sub(limit);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn open_orders(&self, pair: &Pair) -> Result<Vec<Order>> {
        let book = self.book.read().await;
        let mut open: Vec<Order> = book
            .orders
            .values()
            .filter(|o| &o.pair == pair && o.status == OrderStatus::Open)
            .cloned()
            .collect();
        open.sort_by_key(|o| o.created_at);
        Ok(open)
    }

    async fn order(&self, _pair: &Pair, id: &str) -> Result<Order> {
        self.book
            .read()
            .await
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("order {id} not found")))
    }

    async fn order_history(
        &self,
        pair: &Pair,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let book = self.book.read().await;
        let mut history: Vec<Order> = book
            .orders
            .values()
            .filter(|o| &o.pair == pair && o.created_at >= start && o.created_at <= end)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }

    async fn buy(&self, pair: &Pair, rate: Decimal, amount: Decimal) -> Result<String> {
        self.place(pair, OrderSide::Buy, rate, amount).await
    }

    async fn sell(&self, pair: &Pair, rate: Decimal, amount: Decimal) -> Result<String> {
        self.place(pair, OrderSide::Sell, rate, amount).await
    }

    async fn cancel_order(&self, _pair: &Pair, id: &str) -> Result<()> {
        self.order_requests.fetch_add(1, Ordering::SeqCst);
        let mut book = self.book.write().await;
        let order = book
            .orders
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("order {id} not found")))?;
        if order.status != OrderStatus::Open {
            return Err(Error::exchange(Some(400), format!("order {id} is not open")));
        }
        order.status = OrderStatus::Cancelled;
        debug!(id, "Paper order cancelled");
        Ok(())
    }

    async fn confirm_pairs(&self, pairs: &[Pair]) -> Result<Vec<AssetPair>> {
        let book = self.book.read().await;
        pairs
            .iter()
            .map(|pair| {
                if let Some(limits) = book.limits.get(pair) {
                    Ok(limits.clone())
                } else if book.tickers.contains_key(pair) {
                    Ok(AssetPair::unbounded(pair.clone()))
                } else {
                    Err(Error::exchange(None, format!("unknown pair {pair}")))
                }
            })
            .collect()
    }

    async fn confirm_interval(&self, interval_secs: u64) -> Result<()> {
        let supported: HashSet<u64> = SUPPORTED_INTERVALS.iter().copied().collect();
        if supported.contains(&interval_secs) {
            Ok(())
        } else {
            Err(Error::exchange(
                None,
                format!("unsupported candle interval {interval_secs}s"),
            ))
        }
    }
}
