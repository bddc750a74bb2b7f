pub mod session;

pub use session::{ViewSession, WatchSnapshot, WatchState, WatchSubject};
