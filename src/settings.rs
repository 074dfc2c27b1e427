use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::game::GameConfig;
use crate::models::Viewport;
use crate::scoring::SubmissionConfig;
use crate::smoothing::SmoothingConfig;
use crate::targets::TargetConfig;
use crate::tracking::TrackingConfig;

const SETTINGS_ENV: &str = "GAZE_ENGINE_SETTINGS";
const DEFAULT_SETTINGS_FILE: &str = "gaze-engine.json";

/// Endpoints and timing for the two external services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSettings {
    #[serde(flatten)]
    pub tracking: TrackingConfig,
    #[serde(flatten)]
    pub submission: SubmissionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub service: ServiceSettings,
    pub game: GameConfig,
    pub targets: TargetConfig,
    pub smoothing: SmoothingConfig,
    pub viewport: Viewport,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineSettings>,
}

impl SettingsStore {
    /// Load `path`, falling back to defaults when it is missing or malformed.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "ignoring malformed settings in {}: {}",
                    path.display(),
                    err
                );
                EngineSettings::default()
            })
        } else {
            EngineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn from_env() -> Result<Self> {
        let path = std::env::var(SETTINGS_ENV).unwrap_or_else(|_| DEFAULT_SETTINGS_FILE.into());
        Self::new(PathBuf::from(path))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn settings(&self) -> Result<EngineSettings> {
        let guard = self
            .data
            .read()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        Ok(guard.clone())
    }

    pub fn update(&self, settings: EngineSettings) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &EngineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: EngineSettings = serde_json::from_str(&contents)?;
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gaze-engine-{}-{}.json", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn missing_file_uses_defaults() {
        let store = SettingsStore::new(temp_path("missing")).unwrap();
        let settings = store.settings().unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.service.tracking.failure_threshold, 4);
        assert_eq!(settings.game.total_rounds, 3);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let path = temp_path("partial");
        fs::write(
            &path,
            r#"{"service":{"gazeBaseUrl":"http://10.0.0.2:9000","resultsUrl":"http://results"},"game":{"totalRounds":2}}"#,
        )
        .unwrap();

        let settings = SettingsStore::new(path.clone()).unwrap().settings().unwrap();
        assert_eq!(settings.service.tracking.gaze_base_url, "http://10.0.0.2:9000");
        assert_eq!(settings.service.submission.results_url, "http://results");
        assert_eq!(settings.service.tracking.poll_interval_ms, 4);
        assert_eq!(settings.game.total_rounds, 2);
        assert_eq!(settings.game.round_duration_ms, 15_000);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = temp_path("malformed");
        fs::write(&path, "{ not json").unwrap();
        let settings = SettingsStore::new(path.clone()).unwrap().settings().unwrap();
        assert_eq!(settings, EngineSettings::default());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn update_persists_and_reloads() {
        let path = temp_path("update");
        let store = SettingsStore::new(path.clone()).unwrap();
        let mut settings = store.settings().unwrap();
        settings.targets.collision_radius = 150.0;
        store.update(settings).unwrap();

        let reopened = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reopened.settings().unwrap().targets.collision_radius, 150.0);
        reopened.reload().unwrap();
        let _ = fs::remove_file(path);
    }
}
