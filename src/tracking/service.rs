//! HTTP surface of the external camera/gaze service.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::models::Confidence;

use super::config::TrackingConfig;

/// Gaze estimate in the service's own screen resolution.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GazeReading {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub screen_width: Option<f64>,
    #[serde(default)]
    pub screen_height: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct CameraStatus {
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: Option<String>,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

/// Operations the engine needs from the camera/gaze backend.
pub trait GazeService: Send + Sync + 'static {
    fn start_camera(&self) -> impl Future<Output = Result<()>> + Send;
    fn camera_status(&self) -> impl Future<Output = Result<CameraStatus>> + Send;
    /// Latest estimate; any non-success payload is an error.
    fn current_gaze(&self) -> impl Future<Output = Result<GazeReading>> + Send;
    fn stop_camera(&self) -> impl Future<Output = Result<()>> + Send;
}

pub struct HttpGazeService {
    http_client: Client,
    base_url: String,
}

impl HttpGazeService {
    pub fn new(config: &TrackingConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build gaze service HTTP client")?;
        Ok(Self {
            http_client,
            base_url: config.gaze_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl GazeService for HttpGazeService {
    async fn start_camera(&self) -> Result<()> {
        let response = self
            .http_client
            .post(self.url("start-camera"))
            .send()
            .await
            .context("start-camera request failed")?;
        if !response.status().is_success() {
            bail!("camera start failed: HTTP {}", response.status());
        }
        Ok(())
    }

    async fn camera_status(&self) -> Result<CameraStatus> {
        let response = self
            .http_client
            .get(self.url("camera-status"))
            .send()
            .await
            .context("camera-status request failed")?;
        if !response.status().is_success() {
            bail!("camera status failed: HTTP {}", response.status());
        }
        let envelope: Envelope<CameraStatus> = response
            .json()
            .await
            .context("camera-status payload was not valid JSON")?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn current_gaze(&self) -> Result<GazeReading> {
        let response = self
            .http_client
            .get(self.url("current-gaze"))
            .send()
            .await
            .context("current-gaze request failed")?;
        if !response.status().is_success() {
            bail!("HTTP {}", response.status());
        }
        let envelope: Envelope<GazeReading> = response
            .json()
            .await
            .context("current-gaze payload was not valid JSON")?;
        unwrap_gaze(envelope)
    }

    async fn stop_camera(&self) -> Result<()> {
        let response = self
            .http_client
            .post(self.url("stop-camera"))
            .send()
            .await
            .context("stop-camera request failed")?;
        if !response.status().is_success() {
            bail!("camera stop failed: HTTP {}", response.status());
        }
        Ok(())
    }
}

fn unwrap_gaze(envelope: Envelope<GazeReading>) -> Result<GazeReading> {
    match (envelope.status.as_deref(), envelope.data) {
        (Some("success"), Some(reading)) => Ok(reading),
        (_, _) => Err(anyhow!(
            "{}",
            envelope.message.unwrap_or_else(|| "no gaze data".to_string())
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfidenceLevel;

    #[test]
    fn success_payload_yields_reading() {
        let body = r#"{"status":"success","data":{"x":812.5,"y":400,"confidence":"HIGH","screen_width":2560,"screen_height":1440}}"#;
        let envelope: Envelope<GazeReading> = serde_json::from_str(body).unwrap();
        let reading = unwrap_gaze(envelope).unwrap();

        assert_eq!(reading.x, 812.5);
        assert_eq!(reading.confidence, Confidence::Level(ConfidenceLevel::High));
        assert_eq!(reading.screen_width, Some(2560.0));
    }

    #[test]
    fn error_payload_carries_service_message() {
        let body = r#"{"status":"error","message":"Eye tracker needs calibration"}"#;
        let envelope: Envelope<GazeReading> = serde_json::from_str(body).unwrap();
        let err = unwrap_gaze(envelope).unwrap_err();
        assert!(err.to_string().contains("calibration"));
    }

    #[test]
    fn success_without_data_is_an_error() {
        let envelope: Envelope<GazeReading> = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(unwrap_gaze(envelope).is_err());
    }

    #[test]
    fn camera_status_envelope_parses() {
        let envelope: Envelope<CameraStatus> =
            serde_json::from_str(r#"{"status":"success","data":{"active":true}}"#).unwrap();
        assert_eq!(envelope.data, Some(CameraStatus { active: true }));

        let empty: Envelope<CameraStatus> = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        assert_eq!(empty.data.unwrap_or_default(), CameraStatus::default());
    }

    #[test]
    fn missing_resolution_defaults_to_none() {
        let reading: GazeReading = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        assert_eq!(reading.screen_width, None);
        assert_eq!(reading.confidence, Confidence::default());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = TrackingConfig {
            gaze_base_url: "http://localhost:8000/".into(),
            ..TrackingConfig::default()
        };
        let service = HttpGazeService::new(&config).unwrap();
        assert_eq!(service.url("current-gaze"), "http://localhost:8000/current-gaze");
    }
}
