pub mod error;
pub mod game;
pub mod models;
pub mod scoring;
pub mod settings;
pub mod smoothing;
pub mod targets;
pub mod tracking;
mod utils;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;

use game::{GameController, GameEvent};
use models::ChildProfile;
use scoring::HttpResultSink;
use settings::SettingsStore;
use tracking::HttpGazeService;

const USAGE: &str = "usage: gaze-engine <child-id> <age> [--school-task <id>] [--tournament <id>] [--training-allowed] [--suspected-asd]";

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let profile = profile_from_args(std::env::args().skip(1))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(play(profile))
}

async fn play(profile: ChildProfile) -> Result<()> {
    let store = SettingsStore::from_env()?;
    let settings = store.settings()?;
    info!("gaze engine starting, settings from {}", store.path().display());

    let service = Arc::new(HttpGazeService::new(&settings.service.tracking)?);
    let sink = HttpResultSink::new(&settings.service.submission)?;
    let controller = GameController::new(&settings, service, sink);
    let mut events = controller.subscribe_events();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let session_id = tokio::select! {
        _ = &mut ctrl_c => {
            warn!("interrupted during camera start, shutting down");
            controller.shutdown().await?;
            return Ok(());
        }
        started = controller.start_game(profile) => started?,
    };
    info!("session {} running", session_id);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                warn!("interrupted, shutting down");
                controller.shutdown().await?;
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(GameEvent::RoundEnded { record }) => {
                    info!("round {} done: {} hits", record.index + 1, record.result.hits);
                }
                Ok(GameEvent::ResultSubmitted { session_id }) => {
                    info!("results for session {} saved", session_id);
                    break;
                }
                Ok(GameEvent::SubmissionFailed { session_id, reason }) => {
                    warn!("results for session {} were not saved: {}", session_id, reason);
                    break;
                }
                Ok(GameEvent::TrackingLost { reason }) => {
                    controller.shutdown().await?;
                    bail!("gaze tracking lost: {reason}");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("event stream lagged, {} events skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    }

    if let Some(summary) = controller.last_summary().await {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

fn profile_from_args<I>(mut args: I) -> Result<ChildProfile>
where
    I: Iterator<Item = String>,
{
    let child_id = args.next().ok_or_else(|| anyhow!(USAGE))?;
    let age = args
        .next()
        .ok_or_else(|| anyhow!(USAGE))?
        .parse::<u32>()
        .context("age must be a whole number")?;

    let mut profile = ChildProfile {
        child_id,
        age,
        ..ChildProfile::default()
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--school-task" => {
                let task_id = args
                    .next()
                    .ok_or_else(|| anyhow!("--school-task needs a value"))?;
                profile.school_task_id = Some(task_id);
            }
            "--tournament" => {
                let tournament_id = args
                    .next()
                    .ok_or_else(|| anyhow!("--tournament needs a value"))?
                    .parse::<i64>()
                    .context("tournament id must be a number")?;
                profile.tournament_id = Some(tournament_id);
            }
            "--training-allowed" => profile.is_training_allowed = true,
            "--suspected-asd" => profile.suspected_asd = true,
            other => bail!("unknown argument {other}\n{USAGE}"),
        }
    }

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_required_and_optional_arguments() {
        let profile = profile_from_args(args(&[
            "child-3",
            "8",
            "--school-task",
            "task-1",
            "--suspected-asd",
        ]))
        .unwrap();

        assert_eq!(profile.child_id, "child-3");
        assert_eq!(profile.age, 8);
        assert_eq!(profile.school_task_id.as_deref(), Some("task-1"));
        assert!(profile.suspected_asd);
        assert!(!profile.is_training_allowed);
        assert_eq!(profile.tournament_id, None);
    }

    #[test]
    fn rejects_missing_age_and_unknown_flags() {
        assert!(profile_from_args(args(&["child-3"])).is_err());
        assert!(profile_from_args(args(&["child-3", "six"])).is_err());
        assert!(profile_from_args(args(&["child-3", "6", "--fast"])).is_err());
        assert!(profile_from_args(args(&["child-3", "6", "--tournament"])).is_err());
    }
}
