pub mod controller;

pub use controller::WatchController;
