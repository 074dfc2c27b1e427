use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::aggregator::SessionSummary;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmissionConfig {
    pub results_url: String,
    pub submit_timeout_ms: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            results_url: "http://localhost:8086/api/gaze-game/save".into(),
            submit_timeout_ms: 5_000,
        }
    }
}

/// Where finished sessions go.
pub trait ResultSink: Send + Sync + 'static {
    fn submit(&self, summary: &SessionSummary) -> impl Future<Output = Result<()>> + Send;
}

pub struct HttpResultSink {
    http_client: Client,
    results_url: String,
}

impl HttpResultSink {
    pub fn new(config: &SubmissionConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.submit_timeout_ms))
            .build()
            .context("failed to build results HTTP client")?;
        Ok(Self {
            http_client,
            results_url: config.results_url.clone(),
        })
    }
}

impl ResultSink for HttpResultSink {
    async fn submit(&self, summary: &SessionSummary) -> Result<()> {
        let response = self
            .http_client
            .post(&self.results_url)
            .json(&build_payload(summary))
            .send()
            .await
            .context("results request failed")?;
        if !response.status().is_success() {
            bail!("results endpoint returned HTTP {}", response.status());
        }
        Ok(())
    }
}

/// Flat JSON body with one `roundNCount` key per played round.
pub fn build_payload(summary: &SessionSummary) -> Value {
    let child = &summary.child;
    let mut body = Map::new();
    body.insert("sessionId".into(), json!(summary.session_id));
    body.insert("childId".into(), json!(child.child_id));
    body.insert("age".into(), json!(child.age));
    if let Some(task_id) = &child.school_task_id {
        body.insert("schoolTaskId".into(), json!(task_id));
    }
    if let Some(tournament_id) = child.tournament_id {
        body.insert("tournamentId".into(), json!(tournament_id));
    }
    for (i, hits) in summary.round_hits.iter().enumerate() {
        body.insert(format!("round{}Count", i + 1), json!(hits));
    }
    body.insert("isTrainingAllowed".into(), json!(child.is_training_allowed));
    body.insert("suspectedASD".into(), json!(child.suspected_asd));
    Value::Object(body)
}
