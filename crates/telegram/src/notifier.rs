use teloxide::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use common::Notifier;

use crate::commands::send_alert;

/// Delivers notifications to the operator chats without blocking the caller.
pub struct TelegramNotifier {
    bot: Bot,
    chat_ids: Vec<ChatId>,
    events: broadcast::Sender<String>,
}

impl TelegramNotifier {
    pub fn new(token: String, allowed_user_ids: &[i64]) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            bot: Bot::new(token),
            chat_ids: allowed_user_ids.iter().map(|&id| ChatId(id)).collect(),
            events,
        }
    }

    /// Internal events published through `internal_send`.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }
}

impl Notifier for TelegramNotifier {
    fn telegram_send(&self, text: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available, dropping Telegram message");
            return;
        };
        let bot = self.bot.clone();
        let chat_ids = self.chat_ids.clone();
        runtime.spawn(async move { send_alert(&bot, &chat_ids, &text).await });
    }

    fn internal_send(&self, event: &str) {
        debug!(event, "Internal event");
        let _ = self.events.send(event.to_string());
    }
}
