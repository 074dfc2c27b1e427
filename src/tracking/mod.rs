pub mod client;
pub mod config;
mod loop_worker;
pub mod service;

pub use client::{SessionClient, TrackingStatus};
pub use config::TrackingConfig;
pub use service::{CameraStatus, GazeReading, GazeService, HttpGazeService};
