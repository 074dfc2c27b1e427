use thiserror::Error;

/// Failures the engine reports to its caller.
///
/// Only `TrackingUnavailable` and `SubmissionFailed` are user-visible;
/// `TransientSample` is swallowed by the poll loop after it bumps its
/// failure counter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("gaze tracking unavailable: {0}")]
    TrackingUnavailable(String),

    #[error("gaze sample dropped: {0}")]
    TransientSample(String),

    #[error("result submission failed: {0}")]
    SubmissionFailed(String),

    #[error("a camera start or stop is already in flight")]
    TrackingBusy,

    #[error("tracking start was cancelled before it completed")]
    TrackingCancelled,

    #[error("cannot {action} while {from}")]
    InvalidTransition { from: &'static str, action: &'static str },

    #[error("round {0} already recorded")]
    DuplicateRound(u32),

    #[error("session {0} was already submitted")]
    AlreadySubmitted(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
