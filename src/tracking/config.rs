use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingConfig {
    pub gaze_base_url: String,
    pub poll_interval_ms: u64,
    /// Upper bound on any single request to the gaze service.
    pub request_timeout_ms: u64,
    /// Pause between the start request and the first status check.
    pub settle_ms: u64,
    /// Consecutive failed polls that end tracking for good.
    pub failure_threshold: u32,
    /// When false a failed status check is logged and tracking continues.
    pub require_active_status: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            gaze_base_url: "http://127.0.0.1:8000".into(),
            poll_interval_ms: 4,
            request_timeout_ms: 1_000,
            settle_ms: 1_000,
            failure_threshold: 4,
            require_active_status: false,
        }
    }
}
