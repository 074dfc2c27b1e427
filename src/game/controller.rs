use std::sync::Arc;

use log::{info, warn};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};

use crate::error::{EngineError, EngineResult};
use crate::models::{ChildProfile, Session};
use crate::scoring::{ResultSink, ScoreAggregator, SessionSummary};
use crate::settings::EngineSettings;
use crate::targets::TargetField;
use crate::tracking::{GazeService, SessionClient, TrackingStatus};

use super::scheduler::RoundScheduler;
use super::state::{GameEvent, GameSnapshot, PhaseKind, PointerView, TargetView};

const ENABLE_LOGS: bool = true;

use crate::log_info;

const EVENT_CAPACITY: usize = 256;

/// Async driver around `RoundScheduler`.
///
/// One frame ticker owns all game timing: each tick reads the latest smoothed
/// pointer, advances the scheduler and publishes whatever happened. The camera
/// lives in `SessionClient`; finished sessions go through `ScoreAggregator`.
pub struct GameController<S: GazeService, R: ResultSink> {
    scheduler: Arc<Mutex<RoundScheduler>>,
    tracking: Arc<SessionClient<S>>,
    scoring: Arc<Mutex<ScoreAggregator<R>>>,
    summary: Arc<Mutex<Option<SessionSummary>>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    events_tx: broadcast::Sender<GameEvent>,
    frame_interval: Duration,
    heartbeat_every_frames: u32,
}

impl<S: GazeService, R: ResultSink> Clone for GameController<S, R> {
    fn clone(&self) -> Self {
        Self {
            scheduler: Arc::clone(&self.scheduler),
            tracking: Arc::clone(&self.tracking),
            scoring: Arc::clone(&self.scoring),
            summary: Arc::clone(&self.summary),
            ticker: Arc::clone(&self.ticker),
            events_tx: self.events_tx.clone(),
            frame_interval: self.frame_interval,
            heartbeat_every_frames: self.heartbeat_every_frames,
        }
    }
}

impl<S: GazeService, R: ResultSink> GameController<S, R> {
    pub fn new(settings: &EngineSettings, service: Arc<S>, sink: R) -> Self {
        let field = TargetField::new(settings.targets.clone(), settings.viewport);
        let tracking = SessionClient::new(
            service,
            settings.service.tracking.clone(),
            settings.smoothing.clone(),
            settings.viewport,
        );
        Self::from_parts(
            RoundScheduler::new(settings.game.clone(), field),
            tracking,
            ScoreAggregator::new(sink),
        )
    }

    pub fn from_parts(
        scheduler: RoundScheduler,
        tracking: SessionClient<S>,
        scoring: ScoreAggregator<R>,
    ) -> Self {
        let debug_mode = std::env::var("GAZE_ENGINE_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let config = scheduler.config().clone();
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
            tracking: Arc::new(tracking),
            scoring: Arc::new(Mutex::new(scoring)),
            summary: Arc::new(Mutex::new(None)),
            ticker: Arc::new(Mutex::new(None)),
            events_tx,
            frame_interval: Duration::from_millis(config.frame_interval_ms.max(1)),
            heartbeat_every_frames: if debug_mode {
                1
            } else {
                config.heartbeat_every_frames.max(1)
            },
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GameEvent> {
        self.events_tx.subscribe()
    }

    pub fn tracking(&self) -> &SessionClient<S> {
        &self.tracking
    }

    pub async fn phase(&self) -> PhaseKind {
        self.scheduler.lock().await.phase()
    }

    pub async fn last_summary(&self) -> Option<SessionSummary> {
        self.summary.lock().await.clone()
    }

    pub async fn snapshot(&self) -> GameSnapshot {
        let now = Instant::now();
        let mut snapshot = {
            let guard = self.scheduler.lock().await;
            GameSnapshot {
                phase: guard.phase(),
                session_id: guard.session().map(|s| s.id.clone()),
                round_index: guard.round_index(),
                total_rounds: guard.config().total_rounds,
                remaining_ms: guard.remaining(now).as_millis() as u64,
                round_hits: guard.round_hits(),
                score: guard.score(),
                targets: guard.field().targets().iter().map(TargetView::from).collect(),
                pointer: None,
                tracking: self.tracking.status(),
                unavailable_reason: guard.unavailable_reason().map(str::to_string),
                summary: None,
            }
        };
        snapshot.pointer = self
            .tracking
            .latest_pointer()
            .map(|p| PointerView { x: p.x, y: p.y });
        snapshot.summary = self.summary.lock().await.clone();
        snapshot
    }

    /// Begin a session: countdown, frame ticker and camera start.
    ///
    /// Returns the new session id. If the camera cannot be started the game
    /// ends up in `TrackingUnavailable` and the error is returned.
    pub async fn start_game(&self, child: ChildProfile) -> EngineResult<String> {
        let (token, session_id, events) = {
            let mut scheduler = self.scheduler.lock().await;
            let events = scheduler.begin(child, Instant::now())?;
            let session_id = scheduler
                .session()
                .map(|s| s.id.clone())
                .unwrap_or_default();
            (scheduler.token(), session_id, events)
        };
        *self.summary.lock().await = None;
        self.publish(events);
        self.spawn_ticker().await;

        if let Err(err) = self.tracking.start_tracking().await {
            let events = self.scheduler.lock().await.tracking_failed(err.to_string());
            self.publish(events);
            self.cancel_ticker().await;
            let _ = self.tracking.stop_tracking().await;
            return Err(err);
        }

        if !self.scheduler.lock().await.tracking_started(token) {
            // Reset or failed while the camera was starting.
            warn!("session {} was superseded during camera start", session_id);
            let _ = self.tracking.stop_tracking().await;
            return Err(EngineError::TrackingCancelled);
        }

        Ok(session_id)
    }

    /// Cancel everything and return to `Idle`.
    pub async fn reset(&self) -> EngineResult<()> {
        self.cancel_ticker().await;
        self.tracking.stop_tracking().await?;
        self.scheduler.lock().await.reset();
        *self.summary.lock().await = None;
        info!("game reset");
        Ok(())
    }

    /// Stop timers and the camera, leaving the last state readable.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.cancel_ticker().await;
        let events = self
            .scheduler
            .lock()
            .await
            .tracking_failed("engine shut down");
        self.publish(events);
        self.tracking.stop_tracking().await
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let controller = self.clone();
        let handle = tokio::spawn(async move {
            controller.run_frames().await;
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    async fn run_frames(&self) {
        let mut interval = time::interval(self.frame_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut frames: u32 = 0;

        loop {
            interval.tick().await;

            let status = self.tracking.status();
            let pointer = self.tracking.latest_pointer();

            let (events, lost, running) = {
                let mut scheduler = self.scheduler.lock().await;
                let lost = status == TrackingStatus::ConnectionFailed && scheduler.is_running();
                let events = if lost {
                    scheduler.tracking_failed("gaze service stopped responding")
                } else {
                    scheduler.advance(Instant::now(), pointer.as_ref())
                };
                (events, lost, scheduler.is_running())
            };

            if lost {
                let _ = self.tracking.stop_tracking().await;
            }

            if events
                .iter()
                .any(|event| matches!(event, GameEvent::RoundStarted { .. }))
            {
                self.tracking.reseed_pointer();
            }

            // Submission runs in its own task so reset/shutdown aborting
            // this ticker cannot drop it halfway.
            let finished = events.iter().find_map(|event| match event {
                GameEvent::SessionFinished { session } => Some(session.clone()),
                _ => None,
            });
            let is_finished = finished.is_some();
            if let Some(session) = finished {
                let controller = self.clone();
                tokio::spawn(async move {
                    controller.complete_session(session).await;
                });
            }
            self.publish(events);

            if is_finished {
                if let Err(err) = self.tracking.stop_tracking().await {
                    warn!("failed to stop tracking after the last round: {}", err);
                }
            }

            frames = frames.wrapping_add(1);
            if frames % self.heartbeat_every_frames == 0 {
                let snapshot = self.snapshot().await;
                log_info!(
                    "heartbeat phase={:?} round={:?} remaining={}s score={} tracking={:?}",
                    snapshot.phase,
                    snapshot.round_index.map(|i| i + 1),
                    snapshot.remaining_secs(),
                    snapshot.score,
                    snapshot.tracking
                );
            }

            if !running {
                break;
            }
        }
    }

    async fn complete_session(&self, session: Session) {
        let mut scoring = self.scoring.lock().await;
        let summary = scoring.finalize(&session);
        let still_current = self
            .scheduler
            .lock()
            .await
            .session()
            .map_or(false, |s| s.id == summary.session_id);
        if still_current {
            *self.summary.lock().await = Some(summary.clone());
        }

        let session_id = summary.session_id.clone();
        let event = match scoring.submit(&summary).await {
            Ok(()) => GameEvent::ResultSubmitted { session_id },
            Err(err) => GameEvent::SubmissionFailed {
                session_id,
                reason: err.to_string(),
            },
        };
        self.publish(vec![event]);
    }

    fn publish(&self, events: Vec<GameEvent>) {
        for event in events {
            // No subscribers is fine.
            let _ = self.events_tx.send(event);
        }
    }
}
