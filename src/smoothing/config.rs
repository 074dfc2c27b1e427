use serde::{Deserialize, Serialize};

/// Tunable constants for the pointer smoothing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SmoothingConfig {
    /// Kalman process noise `Q`. Small values favor stability over latency.
    pub process_noise: f64,
    /// Kalman measurement noise `R`.
    pub measurement_noise: f64,
    /// Error covariance a filter starts from after a reset.
    pub initial_error_covariance: f64,

    /// Weight of the Kalman output in the exponential blend with the raw value.
    pub filter_weight: f64,

    /// Raw samples older than this are dropped from the history window.
    pub history_window_ms: u64,
    /// Moving-average correction kicks in once the window holds this many samples.
    pub history_min_samples: usize,
    /// Weight of the moving average in the history blend.
    pub history_weight: f64,

    /// Per-sample displacement (px) above which motion counts as deliberate.
    pub velocity_threshold: f64,
    /// Overshoot (px) that maps to a blend factor of 1.0 before capping.
    pub velocity_scale: f64,
    /// Upper bound on how far a fast sample pulls the pointer toward raw.
    pub max_velocity_blend: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            process_noise: 1e-4,
            measurement_noise: 1e-2,
            initial_error_covariance: 1.0,
            filter_weight: 0.6,
            history_window_ms: 200,
            history_min_samples: 3,
            history_weight: 0.3,
            velocity_threshold: 100.0,
            velocity_scale: 200.0,
            max_velocity_blend: 0.3,
        }
    }
}
