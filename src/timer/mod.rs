pub mod controller;
pub mod state;

pub use controller::{FocusSignal, FocusTimer};
pub use state::{FocusState, FocusStatus, Tick};
