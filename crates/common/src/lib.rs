pub mod config;
pub mod error;
pub mod exchange;
pub mod notifier;
pub mod store;
pub mod types;

pub use config::{BotSettings, Config, PairSettings};
pub use error::{Error, Result};
pub use exchange::ExchangeClient;
pub use notifier::{Notifier, NullNotifier};
pub use store::Store;
pub use types::*;
