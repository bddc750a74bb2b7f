mod config;
mod error;
mod events;
pub mod ledger;
pub mod models;
pub mod timer;
pub mod watch;

pub use config::WatchConfig;
pub use error::{LedgerError, WatchError};
pub use events::WatchEvent;
pub use ledger::{CompletedView, HttpRewardLedger, InMemoryLedger, RewardLedger, StartedView};
pub use models::{ViewSession, WatchSnapshot, WatchState, WatchSubject};
pub use watch::WatchController;
