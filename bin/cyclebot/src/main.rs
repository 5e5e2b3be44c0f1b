use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, NullNotifier, Notifier, Store};
use engine::{Engine, FileSettings};
use paper::PaperExchange;
use storage::SqliteStore;
use telegram_ctrl::{start_bot, BotDeps, TelegramNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("loading environment configuration")?;
    info!(config = %cfg.bot_config_path, "CycleBot starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::connect(&cfg.database_url)
            .await
            .context("opening the database")?,
    );

    // ── Exchange ──────────────────────────────────────────────────────────────
    if cfg.paper_balances.is_empty() {
        warn!("PAPER_BALANCES is empty, the paper exchange starts with no funds");
    }
    let exchange = Arc::new(PaperExchange::new(cfg.paper_balances.clone()));

    // ── Notifications ─────────────────────────────────────────────────────────
    let notifier: Arc<dyn Notifier> = match &cfg.telegram_token {
        Some(token) => Arc::new(TelegramNotifier::new(
            token.clone(),
            &cfg.telegram_allowed_user_ids,
        )),
        None => {
            info!("TELEGRAM_TOKEN not set, Telegram control disabled");
            Arc::new(NullNotifier)
        }
    };

    // ── Engine ────────────────────────────────────────────────────────────────
    let settings = Arc::new(FileSettings::new(&cfg.bot_config_path));
    let (engine, engine_handle) = Engine::new(settings, exchange, store.clone(), notifier)
        .context("validating the bot configuration")?;
    tokio::spawn(engine.run());

    // ── Telegram C2 ───────────────────────────────────────────────────────────
    if let Some(token) = cfg.telegram_token.clone() {
        let deps = BotDeps {
            engine: engine_handle.clone(),
            store: store.clone(),
            allowed_user_ids: Arc::new(cfg.telegram_allowed_user_ids.clone()),
        };
        tokio::spawn(start_bot(token, deps));
    }

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c()
        .await
        .context("listening for the shutdown signal")?;
    info!(state = %engine_handle.state().await, "Shutdown signal received. Exiting.");
    Ok(())
}
