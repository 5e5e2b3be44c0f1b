//! Execution of a satisfied strategy's outcomes.

use rust_decimal::Decimal;
use tracing::{debug, info};

use common::{
    balance_of, AssetPair, Balances, ExchangeClient, Notifier, OrderSide, Result, Ticker,
};
use strategy::outcomes::Amount;
use strategy::Outcome;

use crate::cache::{OnConfirm, OrderCache, UnconfirmedOrder};

pub(crate) struct OutcomeContext<'a> {
    pub exchange: &'a dyn ExchangeClient,
    pub notifier: &'a dyn Notifier,
    pub pair: &'a AssetPair,
    pub ticker: &'a Ticker,
    pub balances: &'a Balances,
    pub strategy: &'a str,
}

pub(crate) async fn execute(
    outcome: &mut Outcome,
    ctx: &OutcomeContext<'_>,
    cache: &mut OrderCache,
) -> Result<()> {
    match outcome {
        Outcome::Buy(buy) => {
            let amount = buy.amount;
            buy_with(ctx, cache, amount, None).await
        }
        Outcome::Dca(dca) => {
            if dca.exhausted() {
                info!(
                    pair = %ctx.pair.pair,
                    strategy = ctx.strategy,
                    repeats = dca.repeats,
                    "DCA repeat limit reached, skipping"
                );
                return Ok(());
            }
            let amount = dca.amount;
            buy_with(ctx, cache, amount, Some(OnConfirm::DcaRepeat)).await
        }
        Outcome::Sell => {
            cache.ensure_free()?;
            let base = balance_of(ctx.balances, &ctx.pair.pair.base);
            let (rate, amount) = ctx.pair.transaction(ctx.ticker.bid, base)?;
            place(ctx, cache, OrderSide::Sell, rate, amount, None).await
        }
        Outcome::Telegram(telegram) => {
            let text = telegram.next_message(&ctx.pair.pair.to_string(), ctx.strategy);
            ctx.notifier.telegram_send(text);
            Ok(())
        }
        Outcome::Sandbox => {
            debug!(pair = %ctx.pair.pair, strategy = ctx.strategy, "Sandbox outcome");
            Ok(())
        }
    }
}

async fn buy_with(
    ctx: &OutcomeContext<'_>,
    cache: &mut OrderCache,
    amount: Amount,
    on_confirm: Option<OnConfirm>,
) -> Result<()> {
    cache.ensure_free()?;
    let counter = balance_of(ctx.balances, &ctx.pair.pair.counter);
    let rate = ctx.ticker.ask;
    let amount = amount.resolve(counter, rate)?;
    let (rate, amount) = ctx.pair.transaction(rate, amount)?;
    place(ctx, cache, OrderSide::Buy, rate, amount, on_confirm).await
}

async fn place(
    ctx: &OutcomeContext<'_>,
    cache: &mut OrderCache,
    side: OrderSide,
    rate: Decimal,
    amount: Decimal,
    on_confirm: Option<OnConfirm>,
) -> Result<()> {
    let pair = &ctx.pair.pair;
    let id = match side {
        OrderSide::Buy => ctx.exchange.buy(pair, rate, amount).await?,
        OrderSide::Sell => ctx.exchange.sell(pair, rate, amount).await?,
    };
    info!(%pair, %side, %rate, %amount, strategy = ctx.strategy, id = %id, "Order placed");
    cache.set_unconfirmed(UnconfirmedOrder {
        id,
        side,
        strategy: ctx.strategy.to_string(),
        on_confirm,
    })
}
