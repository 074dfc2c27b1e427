use serde::{Deserialize, Serialize};

use crate::models::{RoundRecord, Session};
use crate::scoring::SessionSummary;
use crate::targets::Target;
use crate::tracking::TrackingStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    pub total_rounds: u32,
    pub round_duration_ms: u64,
    pub countdown_ms: u64,
    pub transition_ms: u64,
    /// Period of the frame ticker that drives hit-testing and round timing.
    pub frame_interval_ms: u64,
    /// Heartbeat log cadence; forced to 1 when `GAZE_ENGINE_DEBUG` is set.
    pub heartbeat_every_frames: u32,
    /// Minimum gap between two scoring hits.
    pub hit_cooldown_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            total_rounds: 3,
            round_duration_ms: 15_000,
            countdown_ms: 3_000,
            transition_ms: 3_000,
            frame_interval_ms: 33,
            heartbeat_every_frames: 30,
            hit_cooldown_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PhaseKind {
    #[default]
    Idle,
    Countdown,
    Active,
    RoundTransition,
    Finished,
    TrackingUnavailable,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Idle => "idle",
            PhaseKind::Countdown => "counting down",
            PhaseKind::Active => "playing a round",
            PhaseKind::RoundTransition => "between rounds",
            PhaseKind::Finished => "finished",
            PhaseKind::TrackingUnavailable => "tracking unavailable",
        }
    }
}

/// Push notifications for renderers; the snapshot remains the source of truth.
#[derive(Debug, Clone)]
pub enum GameEvent {
    CountdownStarted { session_id: String },
    RoundStarted { index: u32, target_id: Option<u64> },
    TargetHit { round_index: u32, target_id: u64, score: u32 },
    RoundEnded { record: RoundRecord },
    SessionFinished { session: Session },
    TrackingLost { reason: String },
    ResultSubmitted { session_id: String },
    SubmissionFailed { session_id: String, reason: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetView {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub popping: bool,
}

impl From<&Target> for TargetView {
    fn from(target: &Target) -> Self {
        Self {
            id: target.id,
            x: target.x,
            y: target.y,
            radius: target.radius,
            popping: !target.is_live(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PointerView {
    pub x: f64,
    pub y: f64,
}

/// Read model handed to the renderer each frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub phase: PhaseKind,
    pub session_id: Option<String>,
    pub round_index: Option<u32>,
    pub total_rounds: u32,
    pub remaining_ms: u64,
    pub round_hits: u32,
    pub score: u32,
    pub targets: Vec<TargetView>,
    pub pointer: Option<PointerView>,
    pub tracking: TrackingStatus,
    pub unavailable_reason: Option<String>,
    pub summary: Option<SessionSummary>,
}

impl GameSnapshot {
    pub fn remaining_secs(&self) -> u64 {
        self.remaining_ms.div_ceil(1_000)
    }
}
