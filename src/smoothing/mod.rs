pub mod config;
pub mod kalman;
pub mod pointer;

pub use config::SmoothingConfig;
pub use kalman::SignalFilter;
pub use pointer::{PointerSmoother, SmoothedPoint};
