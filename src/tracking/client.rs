use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::{info, warn};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, EngineResult};
use crate::models::{Confidence, PointerSample, Viewport};
use crate::smoothing::{PointerSmoother, SmoothingConfig};

use super::config::TrackingConfig;
use super::loop_worker::{poll_loop, PollSettings};
use super::service::GazeService;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TrackingStatus {
    #[default]
    Stopped,
    Starting,
    Tracking { confidence: Option<Confidence> },
    #[serde(rename_all = "camelCase")]
    SignalLost { consecutive_failures: u32 },
    ConnectionFailed,
    StartFailed { reason: String },
}

impl TrackingStatus {
    /// Terminal failures that require an explicit restart.
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            TrackingStatus::ConnectionFailed | TrackingStatus::StartFailed { .. }
        )
    }
}

#[derive(Default)]
struct Lifecycle {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    camera_active: bool,
}

/// Owns the camera/gaze service for the lifetime of a game.
///
/// Start and stop are serialized: a second `start_tracking` while one is in
/// flight is rejected, and `stop_tracking` cancels an in-flight start. The
/// stop request reaches the service at most once per successful camera start.
pub struct SessionClient<S: GazeService> {
    service: Arc<S>,
    config: TrackingConfig,
    smoothing: SmoothingConfig,
    viewport: Viewport,
    lifecycle: Mutex<Lifecycle>,
    starting: AtomicBool,
    reseed: Arc<AtomicBool>,
    status_tx: watch::Sender<TrackingStatus>,
    pointer_tx: watch::Sender<Option<PointerSample>>,
}

struct StartGuard<'a>(&'a AtomicBool);

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<S: GazeService> SessionClient<S> {
    pub fn new(
        service: Arc<S>,
        config: TrackingConfig,
        smoothing: SmoothingConfig,
        viewport: Viewport,
    ) -> Self {
        let (status_tx, _) = watch::channel(TrackingStatus::Stopped);
        let (pointer_tx, _) = watch::channel(None);
        Self {
            service,
            config,
            smoothing,
            viewport,
            lifecycle: Mutex::new(Lifecycle::default()),
            starting: AtomicBool::new(false),
            reseed: Arc::new(AtomicBool::new(false)),
            status_tx,
            pointer_tx,
        }
    }

    pub fn status(&self) -> TrackingStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<TrackingStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_pointer(&self) -> watch::Receiver<Option<PointerSample>> {
        self.pointer_tx.subscribe()
    }

    pub fn latest_pointer(&self) -> Option<PointerSample> {
        *self.pointer_tx.borrow()
    }

    /// Make the next good sample restart both axis filters.
    pub fn reseed_pointer(&self) {
        self.reseed.store(true, Ordering::SeqCst);
    }

    pub async fn is_tracking(&self) -> bool {
        self.lifecycle
            .lock()
            .await
            .handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub async fn start_tracking(&self) -> EngineResult<()> {
        if self
            .starting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::TrackingBusy);
        }
        let _guard = StartGuard(&self.starting);

        let cancel_token = {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.handle.is_some() || lifecycle.camera_active {
                return Err(EngineError::InvalidTransition {
                    from: "tracking",
                    action: "start tracking",
                });
            }
            let token = CancellationToken::new();
            lifecycle.cancel_token = Some(token.clone());
            token
        };

        self.status_tx.send_replace(TrackingStatus::Starting);
        self.pointer_tx.send_replace(None);
        info!("starting camera via {}", self.config.gaze_base_url);

        if let Err(err) = self.service.start_camera().await {
            let reason = format!("{err:#}");
            warn!("camera start failed: {}", reason);
            self.lifecycle.lock().await.cancel_token = None;
            if !cancel_token.is_cancelled() {
                self.status_tx.send_replace(TrackingStatus::StartFailed {
                    reason: reason.clone(),
                });
            }
            return Err(EngineError::TrackingUnavailable(reason));
        }

        // The camera is on even if a stop raced us; whoever flips this flag
        // back sends the one stop request.
        self.lifecycle.lock().await.camera_active = true;
        if cancel_token.is_cancelled() {
            return self.abandon_start().await;
        }

        tokio::select! {
            _ = cancel_token.cancelled() => return self.abandon_start().await,
            _ = tokio::time::sleep(Duration::from_millis(self.config.settle_ms)) => {}
        }

        if let Err(reason) = self.verify_camera().await {
            if self.config.require_active_status {
                warn!("camera not ready: {}", reason);
                self.release_camera().await;
                self.status_tx.send_replace(TrackingStatus::StartFailed {
                    reason: reason.clone(),
                });
                return Err(EngineError::TrackingUnavailable(reason));
            }
            warn!("camera status check failed, continuing anyway: {}", reason);
        }

        let mut lifecycle = self.lifecycle.lock().await;
        if cancel_token.is_cancelled() {
            drop(lifecycle);
            return self.abandon_start().await;
        }

        let settings = PollSettings {
            poll_interval: Duration::from_millis(self.config.poll_interval_ms.max(1)),
            request_timeout: Duration::from_millis(self.config.request_timeout_ms.max(1)),
            failure_threshold: self.config.failure_threshold,
            viewport: self.viewport,
        };
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.service),
            settings,
            PointerSmoother::new(self.smoothing.clone()),
            Arc::clone(&self.reseed),
            self.status_tx.clone(),
            self.pointer_tx.clone(),
            cancel_token,
        ));
        lifecycle.handle = Some(handle);
        self.status_tx
            .send_replace(TrackingStatus::Tracking { confidence: None });
        info!("gaze tracking started");
        Ok(())
    }

    /// Cancel polling and release the camera. Safe to call at any time.
    pub async fn stop_tracking(&self) -> EngineResult<()> {
        let (token, handle) = {
            let mut lifecycle = self.lifecycle.lock().await;
            (lifecycle.cancel_token.take(), lifecycle.handle.take())
        };

        if let Some(token) = token {
            token.cancel();
        }
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!("gaze poll loop task failed to join: {}", err);
            }
        }

        self.release_camera().await;
        self.pointer_tx.send_replace(None);
        self.status_tx.send_replace(TrackingStatus::Stopped);
        Ok(())
    }

    async fn verify_camera(&self) -> Result<(), String> {
        let timeout = Duration::from_millis(self.config.request_timeout_ms.max(1));
        match tokio::time::timeout(timeout, self.service.camera_status()).await {
            Ok(Ok(status)) if status.active => Ok(()),
            Ok(Ok(_)) => Err("camera not active after start request".into()),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(_) => Err("camera status check timed out".into()),
        }
    }

    async fn abandon_start(&self) -> EngineResult<()> {
        info!("tracking start cancelled");
        self.release_camera().await;
        Err(EngineError::TrackingCancelled)
    }

    /// Send the stop request if, and only if, the camera is still marked active.
    async fn release_camera(&self) {
        let was_active = {
            let mut lifecycle = self.lifecycle.lock().await;
            std::mem::replace(&mut lifecycle.camera_active, false)
        };
        if !was_active {
            return;
        }
        if let Err(err) = self.service.stop_camera().await {
            warn!("best-effort camera stop failed: {:#}", err);
        } else {
            info!("camera stopped");
        }
    }
}
