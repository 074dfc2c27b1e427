use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::watch;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::models::{PointerSample, RawSample, Viewport};
use crate::smoothing::PointerSmoother;

use super::client::TrackingStatus;
use super::service::GazeService;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub(crate) struct PollSettings {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub failure_threshold: u32,
    pub viewport: Viewport,
}

/// Poll the gaze service until cancelled or the circuit breaker trips.
///
/// Each successful poll is smoothed and published on `pointer_tx`. After
/// `failure_threshold` consecutive failures the loop reports
/// `ConnectionFailed` and exits without further requests. The smoother is
/// reseeded on the first good sample after an outage and whenever `reseed`
/// has been raised.
pub(crate) async fn poll_loop<S: GazeService>(
    service: Arc<S>,
    settings: PollSettings,
    mut smoother: PointerSmoother,
    reseed: Arc<AtomicBool>,
    status_tx: watch::Sender<TrackingStatus>,
    pointer_tx: watch::Sender<Option<PointerSample>>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let origin = Instant::now();
    let threshold = settings.failure_threshold.max(1);
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            result = tokio::time::timeout(
                settings.request_timeout,
                poll_once(service.as_ref(), &settings.viewport, origin),
            ) => result,
        };

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(EngineError::TransientSample(format!(
                "gaze request timed out after {}ms",
                settings.request_timeout.as_millis()
            ))),
        };

        match result {
            Ok(sample) => {
                let reseed_requested = reseed.swap(false, Ordering::SeqCst);
                if consecutive_failures > 0 || reseed_requested {
                    log_debug!("reseeding pointer filters");
                    smoother.reset();
                }
                consecutive_failures = 0;
                let point = smoother.update(sample.x, sample.y, sample.timestamp_ms);
                pointer_tx.send_replace(Some(PointerSample {
                    x: point.x,
                    y: point.y,
                    raw_x: sample.x,
                    raw_y: sample.y,
                    confidence: sample.confidence,
                    sampled_at: Instant::now(),
                }));
                set_status(
                    &status_tx,
                    TrackingStatus::Tracking {
                        confidence: Some(sample.confidence),
                    },
                );
                log_debug!(
                    "gaze raw=({:.1}, {:.1}) smooth=({:.1}, {:.1})",
                    sample.x,
                    sample.y,
                    point.x,
                    point.y
                );
            }
            Err(err) => {
                consecutive_failures += 1;
                if consecutive_failures >= threshold {
                    log_error!(
                        "gaze service failed {} polls in a row, giving up: {}",
                        consecutive_failures,
                        err
                    );
                    set_status(&status_tx, TrackingStatus::ConnectionFailed);
                    break;
                }
                log_warn!(
                    "gaze poll failed ({}/{}): {}",
                    consecutive_failures,
                    threshold,
                    err
                );
                set_status(
                    &status_tx,
                    TrackingStatus::SignalLost {
                        consecutive_failures,
                    },
                );
            }
        }
    }

    log_info!("gaze poll loop stopped");
}

async fn poll_once<S: GazeService>(
    service: &S,
    viewport: &Viewport,
    origin: Instant,
) -> Result<RawSample, EngineError> {
    let reading = service
        .current_gaze()
        .await
        .map_err(|err| EngineError::TransientSample(format!("{err:#}")))?;

    if !reading.x.is_finite() || !reading.y.is_finite() {
        return Err(EngineError::TransientSample(
            "gaze coordinates were not finite".into(),
        ));
    }

    let (x, y) = viewport.rescale(
        reading.x,
        reading.y,
        reading.screen_width.unwrap_or(0.0),
        reading.screen_height.unwrap_or(0.0),
    );

    Ok(RawSample {
        x,
        y,
        confidence: reading.confidence,
        timestamp_ms: origin.elapsed().as_millis() as u64,
    })
}

fn set_status(status_tx: &watch::Sender<TrackingStatus>, next: TrackingStatus) {
    status_tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}
