pub mod buy_price;
pub mod cache;
pub mod coordinator;
mod dispatch;
pub mod lifecycle;
pub mod settings;
pub mod stream;

pub use buy_price::average_buy_price;
pub use cache::{OnConfirm, OrderCache, UnconfirmedOrder};
pub use coordinator::{Coordinator, CycleReport};
pub use lifecycle::{CommandError, Engine, EngineHandle};
pub use settings::{FileSettings, Settings, SettingsSource, StaticSettings};
pub use stream::{CycleContext, Stream};
