use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use common::{
    balance_of, AssetPair, Balances, CycleResult, ExchangeClient, Notifier, OrderStatus, Pair,
    PairCycle, PairSettings, Result, Store, Ticker,
};
use strategy::{MarketData, Strategy, StreamMode};

use crate::buy_price::average_buy_price;
use crate::cache::{OnConfirm, OrderCache};
use crate::dispatch::{execute, OutcomeContext};

/// Collaborators and per-cycle inputs shared by every stream of a cycle.
#[derive(Clone)]
pub struct CycleContext {
    pub exchange: Arc<dyn ExchangeClient>,
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    /// Balances fetched once at the start of the cycle.
    pub balances: Arc<Balances>,
    /// Cycle records kept per pair.
    pub keep: usize,
}

/// One pair's runtime: its own strategy instances and order lifecycle.
pub struct Stream {
    pair: AssetPair,
    settings: PairSettings,
    strategies: Vec<Strategy>,
    cache: OrderCache,
}

impl Stream {
    pub fn new(pair: AssetPair, settings: PairSettings, strategies: Vec<Strategy>) -> Self {
        Self {
            pair,
            settings,
            strategies,
            cache: OrderCache::default(),
        }
    }

    pub fn pair(&self) -> &Pair {
        &self.pair.pair
    }

    pub fn asset_pair(&self) -> &AssetPair {
        &self.pair
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn cache(&self) -> &OrderCache {
        &self.cache
    }

    /// Run one cycle and persist its record.
    pub async fn cycle(&mut self, ctx: &CycleContext) -> PairCycle {
        self.cycle_at(ctx, Utc::now()).await
    }

    pub async fn cycle_at(&mut self, ctx: &CycleContext, now: DateTime<Utc>) -> PairCycle {
        let record = match self.run(ctx, now).await {
            Ok(result) => PairCycle::succeeded(now, result),
            Err(e) => {
                warn!(pair = %self.pair.pair, error = %e, "Pair cycle failed");
                PairCycle::failed(now, &e)
            }
        };
        if let Err(e) = ctx.store.save_pair_cycle(&self.pair.pair, &record, ctx.keep).await {
            error!(pair = %self.pair.pair, error = %e, "Failed to save pair cycle");
        }
        record
    }

    async fn run(&mut self, ctx: &CycleContext, now: DateTime<Utc>) -> Result<CycleResult> {
        let exchange = ctx.exchange.as_ref();
        let pair = self.pair.pair.clone();

        let (open, cancelled) = self.handle_open_orders(exchange, now).await?;
        self.confirm(ctx).await?;
        if open > 0 {
            debug!(%pair, open, cancelled, "Open orders remain, skipping evaluation");
            return Ok(CycleResult::OpenOrders { open, cancelled });
        }

        let ticker = exchange.ticker(&pair).await?;
        let base = balance_of(&ctx.balances, &pair.base);
        let mode = self.mode(&ticker, base);

        let candles_needed = self
            .strategies
            .iter()
            .filter(|s| s.mode().applies_to(mode))
            .map(Strategy::candles_required)
            .max()
            .unwrap_or(0);
        let candles = if candles_needed > 0 {
            exchange
                .candles(&pair, self.settings.interval_secs, now, candles_needed)
                .await?
        } else {
            Vec::new()
        };

        let avg_buy_price = match mode {
            StreamMode::Sell => {
                let start = now - Duration::days(i64::from(self.settings.history_days));
                let history = exchange.order_history(&pair, start, now).await?;
                average_buy_price(&history, base)
            }
            StreamMode::Buy => Decimal::ZERO,
        };

        let data = MarketData {
            ticker: ticker.clone(),
            candles,
            avg_buy_price,
        };
        debug!(%pair, ?mode, candles = data.candles.len(), %avg_buy_price, "Evaluating strategies");

        let mut snapshots = Vec::new();
        for strategy in self
            .strategies
            .iter_mut()
            .filter(|s| s.mode().applies_to(mode))
        {
            if strategy.evaluate(&data)? {
                let name = strategy.name().to_string();
                info!(%pair, strategy = %name, "Strategy conditions met");
                let outcome_ctx = OutcomeContext {
                    exchange,
                    notifier: ctx.notifier.as_ref(),
                    pair: &self.pair,
                    ticker: &ticker,
                    balances: &ctx.balances,
                    strategy: &name,
                };
                for outcome in strategy.outcomes_mut() {
                    execute(outcome, &outcome_ctx, &mut self.cache).await?;
                }
                strategy.reset(false);
            }
            snapshots.push(strategy.snapshot());
        }

        Ok(CycleResult::Strategies {
            strategies: snapshots,
        })
    }

    /// Below the pair's minimum order value the stream has nothing to sell.
    fn mode(&self, ticker: &Ticker, base: Decimal) -> StreamMode {
        let value = ticker.bid * base;
        if value <= Decimal::ZERO || value < self.pair.min_value {
            StreamMode::Buy
        } else {
            StreamMode::Sell
        }
    }

    /// Cancel expired open orders. Returns (still open, cancelled).
    async fn handle_open_orders(
        &mut self,
        exchange: &dyn ExchangeClient,
        now: DateTime<Utc>,
    ) -> Result<(usize, usize)> {
        let pair = &self.pair.pair;
        let open = exchange.open_orders(pair).await?;
        let mut cancelled = 0;
        let mut gone = 0;

        if self.settings.cancel_open_orders {
            let lifespan = Duration::seconds(self.settings.open_order_lifespan_secs as i64);
            for order in &open {
                if now < self.cache.deadline(&order.id, now, lifespan) {
                    continue;
                }
                match exchange.cancel_order(pair, &order.id).await {
                    Ok(()) => {
                        info!(%pair, id = %order.id, "Cancelled expired open order");
                        cancelled += 1;
                    }
                    Err(e) if e.is_not_found() => {
                        debug!(%pair, id = %order.id, "Expired order already gone");
                        gone += 1;
                    }
                    Err(e) => return Err(e),
                }
                self.cache.forget(&order.id);
            }
        }

        self.cache.prune(open.iter().map(|o| o.id.as_str()));
        Ok((open.len() - cancelled - gone, cancelled))
    }

    /// Check the order awaiting confirmation, if any.
    async fn confirm(&mut self, ctx: &CycleContext) -> Result<()> {
        let Some(pending) = self.cache.unconfirmed().cloned() else {
            return Ok(());
        };
        let pair = self.pair.pair.clone();

        match ctx.exchange.order(&pair, &pending.id).await {
            Ok(mut order) if order.is_filled() => {
                order.strategy = Some(pending.strategy.clone());
                ctx.store.save_pair_order(&pair, &order).await?;
                ctx.store.increment_session_orders();
                if pending.on_confirm == Some(OnConfirm::DcaRepeat) {
                    if let Some(strategy) = self
                        .strategies
                        .iter_mut()
                        .find(|s| s.name() == pending.strategy)
                    {
                        strategy.confirm_dca();
                    }
                }
                self.cache.clear_unconfirmed();
                info!(%pair, id = %order.id, side = %order.side, strategy = %pending.strategy, "Order confirmed");
                ctx.notifier.telegram_send(format!(
                    "{} {} {} @ {} filled ({})",
                    order.side, order.amount, pair, order.rate, pending.strategy
                ));
            }
            Ok(order) if order.status == OrderStatus::Cancelled => {
                warn!(%pair, id = %order.id, "Unconfirmed order was cancelled");
                self.cache.clear_unconfirmed();
            }
            Ok(_) => debug!(%pair, id = %pending.id, "Order not filled yet"),
            Err(e) if e.is_not_found() => {
                warn!(%pair, id = %pending.id, "Unconfirmed order no longer exists");
                self.cache.clear_unconfirmed();
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use common::{Error, NullNotifier, OrderSide, RejectionReason};
    use paper::PaperExchange;
    use rust_decimal_macros::dec;
    use storage::MemoryStore;
    use strategy::{Outcome, StrategyConfig};

    fn btc() -> Pair {
        Pair::new("BTC", "USDT")
    }

    fn settings(strategies: &[&str]) -> PairSettings {
        PairSettings {
            interval_secs: 300,
            strategies: strategies.iter().map(|s| s.to_string()).collect(),
            cancel_open_orders: false,
            open_order_lifespan_secs: 60,
            history_days: 30,
        }
    }

    fn strategy(src: &str) -> Strategy {
        toml::from_str::<StrategyConfig>(src).unwrap().build().unwrap()
    }

    /// The end-to-end pair of tools: ask fixed at 80 and last above buy + 2.
    fn spot_buyer() -> Strategy {
        strategy(
            r#"
            name = "spot"
            sequence = "test1 and test2"

            [tools.test1]
            type = "change"
            object = { source = "ask" }
            shift = { kind = "fixed", value = 80 }
            comparator = "equal"

            [tools.test2]
            type = "buy_price"
            price = { source = "last" }
            shift = { kind = "units", value = 2 }
            comparator = "above"

            [[outcomes]]
            type = "buy"
            amount = { kind = "counter", value = 100 }
            "#,
        )
    }

    fn seller() -> Strategy {
        strategy(
            r#"
            name = "exit"
            sequence = "up"

            [tools.up]
            type = "buy_price"
            price = { source = "bid" }
            shift = { kind = "percent", value = 10 }
            comparator = "above_or_equal"

            [[outcomes]]
            type = "sell"
            "#,
        )
    }

    fn ticker(price: Decimal) -> Ticker {
        Ticker {
            last: price,
            ask: price,
            bid: price,
            ..Ticker::default()
        }
    }

    struct Harness {
        paper: Arc<PaperExchange>,
        store: Arc<MemoryStore>,
    }

    impl Harness {
        fn new(usdt: Decimal) -> Self {
            Self {
                paper: Arc::new(PaperExchange::new(HashMap::from([(
                    "USDT".to_string(),
                    usdt,
                )]))),
                store: Arc::new(MemoryStore::new()),
            }
        }

        async fn ctx(&self) -> CycleContext {
            CycleContext {
                exchange: self.paper.clone(),
                store: self.store.clone(),
                notifier: Arc::new(NullNotifier),
                balances: Arc::new(self.paper.balances().await.unwrap()),
                keep: 5,
            }
        }
    }

    fn met(record: &PairCycle, name: &str) -> bool {
        match &record.result {
            Some(CycleResult::Strategies { strategies }) => strategies
                .iter()
                .find(|s| s.name == name)
                .is_some_and(|s| s.met),
            _ => false,
        }
    }

    #[tokio::test]
    async fn end_to_end_buy_fires_once() {
        let h = Harness::new(dec!(1000));
        let mut stream = Stream::new(
            AssetPair::unbounded(btc()),
            settings(&["spot"]),
            vec![spot_buyer()],
        );

        h.paper.set_ticker(&btc(), ticker(dec!(30))).await;
        let first = stream.cycle(&h.ctx().await).await;
        assert!(first.success);
        assert!(!met(&first, "spot"));
        assert_eq!(h.paper.order_requests(), 0);

        h.paper.set_ticker(&btc(), ticker(dec!(80))).await;
        let second = stream.cycle(&h.ctx().await).await;
        assert!(second.success, "{:?}", second.error);
        assert!(met(&second, "spot"));
        assert_eq!(h.paper.order_requests(), 1);
        assert_eq!(h.paper.balance("BTC").await, dec!(1.25));

        // holding now: the buy strategy no longer applies; the fill is confirmed
        let third = stream.cycle(&h.ctx().await).await;
        assert!(third.success);
        assert_eq!(h.paper.order_requests(), 1);
        assert_eq!(h.store.session_orders(), 1);
        assert!(stream.cache().unconfirmed().is_none());

        let saved = h.store.orders(Utc::now() - Duration::hours(1), Utc::now()).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].strategy.as_deref(), Some("spot"));
        assert_eq!(h.store.pair_cycles(&btc()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn confirmed_dca_counts_towards_its_repeat_limit() {
        let h = Harness::new(dec!(1000));
        h.paper.set_balance("BTC", dec!(1)).await;
        h.paper.set_ticker(&btc(), ticker(dec!(10))).await;
        let averaging = strategy(
            r#"
            name = "average down"
            sequence = "cheap"

            [tools.cheap]
            type = "change"
            object = { source = "ask" }
            shift = { kind = "fixed", value = 1000 }
            comparator = "below"

            [[outcomes]]
            type = "dca"
            amount = { kind = "base", value = 1 }
            max_repeats = 1
            "#,
        );
        let mut stream = Stream::new(
            AssetPair::unbounded(btc()),
            settings(&["average down"]),
            vec![averaging],
        );

        for _ in 0..4 {
            let record = stream.cycle(&h.ctx().await).await;
            assert!(record.success, "{:?}", record.error);
            assert!(met(&record, "average down"));
        }

        // one order placed and confirmed; every later trigger is skipped
        assert_eq!(h.paper.order_requests(), 1);
        assert_eq!(h.store.session_orders(), 1);
        assert_eq!(h.paper.balance("BTC").await, dec!(2));
        assert!(stream.cache().unconfirmed().is_none());
        match &stream.strategies()[0].outcomes()[0] {
            Outcome::Dca(dca) => assert!(dca.exhausted()),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn vanished_order_heals_and_open_orders_skip_evaluation() {
        let h = Harness::new(dec!(1000));
        h.paper.set_auto_fill(false).await;
        let always = strategy(
            r#"
            name = "always"
            sequence = "cheap"

            [tools.cheap]
            type = "change"
            object = { source = "ask" }
            shift = { kind = "fixed", value = 1000 }
            comparator = "below"

            [[outcomes]]
            type = "buy"
            amount = { kind = "base", value = 1 }
            "#,
        );
        let mut stream = Stream::new(AssetPair::unbounded(btc()), settings(&["always"]), vec![always]);
        h.paper.set_ticker(&btc(), ticker(dec!(10))).await;

        assert!(stream.cycle(&h.ctx().await).await.success);
        assert_eq!(h.paper.order_requests(), 1);

        // the order is gone from the open list but still unconfirmed
        let pending = stream.cache().unconfirmed().unwrap().id.clone();
        h.paper.forget_order(&pending).await;
        let record = stream.cycle(&h.ctx().await).await;
        // not-found heals the slot; the strategy then places a new order
        assert!(record.success);
        assert_eq!(h.paper.order_requests(), 2);

        let ctx = h.ctx().await;
        let next = stream.cache().unconfirmed().unwrap().id.clone();
        // still open: evaluation is skipped, nothing is sent
        let record = stream.cycle(&ctx).await;
        assert!(matches!(record.result, Some(CycleResult::OpenOrders { open: 1, .. })));
        assert_eq!(h.paper.order_requests(), 2);
        assert_eq!(stream.cache().unconfirmed().unwrap().id, next);
    }

    #[tokio::test]
    async fn collision_rule_rejects_before_exchange() {
        let h = Harness::new(dec!(1000));
        let mut cache = OrderCache::default();
        cache
            .set_unconfirmed(crate::cache::UnconfirmedOrder {
                id: "x".into(),
                side: OrderSide::Buy,
                strategy: "s".into(),
                on_confirm: None,
            })
            .unwrap();

        let pair = AssetPair::unbounded(btc());
        let t = ticker(dec!(10));
        let balances = h.paper.balances().await.unwrap();
        let ctx = OutcomeContext {
            exchange: h.paper.as_ref(),
            notifier: &NullNotifier,
            pair: &pair,
            ticker: &t,
            balances: &balances,
            strategy: "s",
        };
        let mut outcome: Outcome = toml::from_str(
            r#"
            type = "buy"
            amount = { kind = "base", value = 1 }
            "#,
        )
        .unwrap();
        let err = execute(&mut outcome, &ctx, &mut cache).await.unwrap_err();
        assert!(matches!(
            err,
            Error::OrderRejected {
                reason: RejectionReason::OrderCollision
            }
        ));
        let err = execute(&mut Outcome::Sell, &ctx, &mut cache)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OrderRejected { .. }));
        assert_eq!(h.paper.order_requests(), 0);
    }

    #[tokio::test]
    async fn expired_open_orders_are_cancelled() {
        let h = Harness::new(dec!(1000));
        h.paper.set_auto_fill(false).await;
        h.paper.set_ticker(&btc(), ticker(dec!(10))).await;
        h.paper.buy(&btc(), dec!(9), dec!(1)).await.unwrap();

        let mut pair_settings = settings(&["exit"]);
        pair_settings.cancel_open_orders = true;
        let mut stream = Stream::new(AssetPair::unbounded(btc()), pair_settings, vec![seller()]);

        let now = Utc::now();
        let record = stream.cycle_at(&h.ctx().await, now).await;
        assert!(matches!(
            record.result,
            Some(CycleResult::OpenOrders { open: 1, cancelled: 0 })
        ));
        assert_eq!(stream.cache().tracked(), 1);

        let record = stream
            .cycle_at(&h.ctx().await, now + Duration::seconds(61))
            .await;
        assert!(record.success);
        assert!(matches!(record.result, Some(CycleResult::Strategies { .. })));
        assert!(h.paper.open_orders(&btc()).await.unwrap().is_empty());
        assert_eq!(stream.cache().tracked(), 0);
    }

    #[tokio::test]
    async fn sells_above_average_buy_price() {
        let h = Harness::new(dec!(1000));
        h.paper.buy(&btc(), dec!(10), dec!(5)).await.unwrap();
        let mut stream = Stream::new(AssetPair::unbounded(btc()), settings(&["exit"]), vec![seller()]);

        h.paper.set_ticker(&btc(), ticker(dec!(10.5))).await;
        let record = stream.cycle(&h.ctx().await).await;
        assert!(record.success, "{:?}", record.error);
        assert!(!met(&record, "exit"));

        h.paper.set_ticker(&btc(), ticker(dec!(11))).await;
        let record = stream.cycle(&h.ctx().await).await;
        assert!(met(&record, "exit"));
        assert_eq!(h.paper.balance("BTC").await, Decimal::ZERO);
        assert_eq!(h.paper.balance("USDT").await, dec!(1005));
    }

    #[tokio::test]
    async fn data_errors_fail_only_the_cycle() {
        let h = Harness::new(dec!(1000));
        let rsi = strategy(
            r#"
            name = "rsi"
            sequence = "low"

            [tools.low]
            type = "rsi"
            period = 14
            comparator = "below"
            level = 30

            [[outcomes]]
            type = "sandbox"
            "#,
        );
        let mut stream = Stream::new(AssetPair::unbounded(btc()), settings(&["rsi"]), vec![rsi]);
        h.paper.set_ticker(&btc(), ticker(dec!(10))).await;

        let record = stream.cycle(&h.ctx().await).await;
        assert!(!record.success);
        assert!(record.error.unwrap().contains("RSI"));
        assert_eq!(h.store.pair_cycles(&btc()).await.unwrap().len(), 1);
    }
}
