use std::sync::Arc;

use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};
use tracing::{info, warn};

use common::{SideTasks, Store};
use engine::{CommandError, EngineHandle};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dependencies injected into every handler via `dptree`.
#[derive(Clone)]
pub struct BotDeps {
    pub engine: EngineHandle,
    pub store: Arc<dyn Store>,
    pub allowed_user_ids: Arc<Vec<i64>>,
}

/// Telegram bot commands exposed to the operator.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "CycleBot commands:")]
pub enum Command {
    #[command(description = "Start trading. Options: cancel, sell")]
    Start(String),
    #[command(description = "Stop trading. Options: cancel, sell")]
    Stop(String),
    #[command(description = "Stop then start. Options: cancel, sell")]
    Restart(String),
    #[command(description = "Show engine state and orders since start")]
    Status,
}

/// Start the Telegram bot in long-polling mode.
pub async fn start_bot(token: String, deps: BotDeps) {
    let bot = Bot::new(token);
    let deps = Arc::new(deps);

    info!("Telegram bot starting (long-polling)");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start(args)].endpoint(handle_start))
        .branch(case![Command::Stop(args)].endpoint(handle_stop))
        .branch(case![Command::Restart(args)].endpoint(handle_restart))
        .branch(case![Command::Status].endpoint(handle_status));

    Update::filter_message()
        .filter_map(|msg: Message| msg.from().map(|u| u.id))
        .filter_async(auth_filter)
        .branch(command_handler)
}

/// Silently drop messages from users not in the allowed list.
async fn auth_filter(user_id: UserId, deps: Arc<BotDeps>) -> bool {
    let uid = user_id.0 as i64;
    let allowed = deps.allowed_user_ids.contains(&uid);
    if !allowed {
        warn!(user_id = uid, "Unauthorized Telegram access attempt");
    }
    allowed
}

/// Parse `cancel` and `sell` options, in any order and case.
pub fn parse_side_tasks(args: &str) -> Result<SideTasks, String> {
    let mut tasks = SideTasks::default();
    for word in args.split_whitespace() {
        match word.to_lowercase().as_str() {
            "cancel" => tasks.cancel_open_orders = true,
            "sell" => tasks.sell_all = true,
            other => return Err(format!("Unknown option '{other}'. Use: cancel, sell")),
        }
    }
    Ok(tasks)
}

fn reply_text(action: &str, result: Result<(), CommandError>) -> String {
    match result {
        Ok(()) => format!("Engine {action}."),
        Err(CommandError::AlreadyPending) => "That command is already in progress.".to_string(),
        Err(CommandError::AlreadyRunning) => "Engine is already running.".to_string(),
        Err(CommandError::AlreadyIdle) => "Engine is already stopped.".to_string(),
        Err(CommandError::Failed(e)) => format!("Command failed: {e}"),
        Err(CommandError::Closed) => "Engine is shut down.".to_string(),
    }
}

async fn handle_start(bot: Bot, msg: Message, args: String, deps: Arc<BotDeps>) -> HandlerResult {
    let text = match parse_side_tasks(&args) {
        Ok(tasks) => reply_text("started", deps.engine.start(tasks).await),
        Err(e) => e,
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn handle_stop(bot: Bot, msg: Message, args: String, deps: Arc<BotDeps>) -> HandlerResult {
    let text = match parse_side_tasks(&args) {
        Ok(tasks) => {
            bot.send_message(msg.chat.id, "Stopping after the current cycle\u{2026}")
                .await?;
            reply_text("stopped", deps.engine.stop(tasks).await)
        }
        Err(e) => e,
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn handle_restart(
    bot: Bot,
    msg: Message,
    args: String,
    deps: Arc<BotDeps>,
) -> HandlerResult {
    let text = match parse_side_tasks(&args) {
        Ok(tasks) => reply_text("restarted", deps.engine.restart(tasks).await),
        Err(e) => e,
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn handle_status(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let state = deps.engine.state().await;
    let orders = deps.store.session_orders();
    let text = format!(
        "CycleBot Status\n\
         Engine: {state}\n\
         Orders since start: {orders}"
    );
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Send a proactive alert to all configured chat IDs.
pub async fn send_alert(bot: &Bot, chat_ids: &[ChatId], message: &str) {
    for &chat_id in chat_ids {
        if let Err(e) = bot.send_message(chat_id, message).await {
            warn!(chat_id = ?chat_id, error = %e, "Failed to send Telegram alert");
        }
    }
}
