//! Turns a finished session log into a summary and submits it once.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::{ChildProfile, Session};

use super::sink::ResultSink;

/// Result screen data for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub child: ChildProfile,
    /// Hits per round, in round order.
    pub round_hits: Vec<u32>,
    pub total_score: u32,
    /// 1-based round number with the most hits (earliest wins ties).
    pub best_round: Option<u32>,
    pub worst_round: Option<u32>,
    pub average_per_round: f64,
    pub total_play_ms: u64,
    pub total_spawned: u32,
    /// Popped over spawned per round, as percentages.
    pub round_accuracy: Vec<f64>,
    pub average_accuracy: f64,
    /// Zero when nothing was popped.
    pub average_time_to_pop_ms: f64,
    pub time_to_pop_variance: f64,
    pub fastest_pop_ms: Option<u64>,
    pub slowest_pop_ms: Option<u64>,
    pub balloons_per_second: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

pub struct ScoreAggregator<R: ResultSink> {
    sink: R,
    submitted: HashSet<String>,
}

impl<R: ResultSink> ScoreAggregator<R> {
    pub fn new(sink: R) -> Self {
        Self {
            sink,
            submitted: HashSet::new(),
        }
    }

    /// Derive totals from the round log only.
    pub fn finalize(&self, session: &Session) -> SessionSummary {
        let mut rounds: Vec<_> = session.rounds.iter().collect();
        rounds.sort_by_key(|r| r.index);

        let round_hits: Vec<u32> = rounds.iter().map(|r| r.result.hits).collect();
        let total_score: u32 = round_hits.iter().sum();
        let total_play_ms: u64 = rounds.iter().map(|r| r.result.elapsed_ms).sum();

        let mut best: Option<(usize, u32)> = None;
        let mut worst: Option<(usize, u32)> = None;
        for (i, &hits) in round_hits.iter().enumerate() {
            if best.map_or(true, |(_, b)| hits > b) {
                best = Some((i, hits));
            }
            if worst.map_or(true, |(_, w)| hits < w) {
                worst = Some((i, hits));
            }
        }

        let average_per_round = mean(round_hits.iter().map(|&h| f64::from(h)));
        let total_spawned: u32 = rounds.iter().map(|r| r.spawned).sum();
        let round_accuracy: Vec<f64> = rounds.iter().map(|r| r.accuracy()).collect();
        let average_accuracy = mean(round_accuracy.iter().copied());

        let times: Vec<u64> = rounds
            .iter()
            .flat_map(|r| r.pops.iter().map(|p| p.time_to_pop_ms))
            .collect();
        let average_time_to_pop_ms = mean(times.iter().map(|&t| t as f64));
        let time_to_pop_variance = mean(
            times
                .iter()
                .map(|&t| (t as f64 - average_time_to_pop_ms).powi(2)),
        );

        let balloons_per_second = if total_play_ms > 0 {
            f64::from(total_spawned) / (total_play_ms as f64 / 1_000.0)
        } else {
            0.0
        };

        SessionSummary {
            session_id: session.id.clone(),
            child: session.child.clone(),
            round_hits,
            total_score,
            best_round: best.map(|(i, _)| i as u32 + 1),
            worst_round: worst.map(|(i, _)| i as u32 + 1),
            average_per_round,
            total_play_ms,
            total_spawned,
            round_accuracy,
            average_accuracy,
            average_time_to_pop_ms,
            time_to_pop_variance,
            fastest_pop_ms: times.iter().copied().min(),
            slowest_pop_ms: times.iter().copied().max(),
            balloons_per_second,
            started_at: session.started_at,
            ended_at: session.ended_at,
        }
    }

    /// POST the summary once. Failures are reported, never retried.
    pub async fn submit(&mut self, summary: &SessionSummary) -> EngineResult<()> {
        if !self.submitted.insert(summary.session_id.clone()) {
            return Err(EngineError::AlreadySubmitted(summary.session_id.clone()));
        }

        match self.sink.submit(summary).await {
            Ok(()) => {
                info!(
                    "submitted session {} (score {})",
                    summary.session_id, summary.total_score
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "failed to submit session {}: {:#}",
                    summary.session_id, err
                );
                Err(EngineError::SubmissionFailed(format!("{err:#}")))
            }
        }
    }

    pub fn was_submitted(&self, session_id: &str) -> bool {
        self.submitted.contains(session_id)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PopStat, RoundRecord, RoundResult};
    use anyhow::{bail, Result};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[derive(Clone, Default)]
    struct CountingSink {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ResultSink for CountingSink {
        async fn submit(&self, _summary: &SessionSummary) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("HTTP 503");
            }
            Ok(())
        }
    }

    fn session_with(hits: &[u32]) -> Session {
        let now = Utc::now();
        let mut session = Session::new(
            ChildProfile {
                child_id: "child-7".into(),
                age: 6,
                ..ChildProfile::default()
            },
            now,
        );
        for (i, &h) in hits.iter().enumerate() {
            session
                .record_round(RoundRecord {
                    index: i as u32,
                    started_at: now,
                    duration_ms: 15_000,
                    deadline: now,
                    result: RoundResult {
                        hits: h,
                        elapsed_ms: 15_000,
                    },
                    spawned: h + 1,
                    pops: (0..h)
                        .map(|n| PopStat {
                            target_id: u64::from(n) + 1,
                            spawned_after_ms: 0,
                            popped_after_ms: 1_000 * u64::from(n + 1),
                            time_to_pop_ms: 1_000 * u64::from(n + 1),
                            distance: 10.0,
                        })
                        .collect(),
                })
                .unwrap();
        }
        session.finish(now).unwrap();
        session
    }

    #[test]
    fn finalize_derives_totals_from_round_log() {
        let aggregator = ScoreAggregator::new(CountingSink::default());
        let summary = aggregator.finalize(&session_with(&[4, 9, 2]));

        assert_eq!(summary.round_hits, vec![4, 9, 2]);
        assert_eq!(summary.total_score, 15);
        assert_eq!(summary.best_round, Some(2));
        assert_eq!(summary.worst_round, Some(3));
        assert_eq!(summary.average_per_round, 5.0);
        assert_eq!(summary.total_play_ms, 45_000);
    }

    #[test]
    fn finalize_reports_accuracy_and_pop_timing() {
        let aggregator = ScoreAggregator::new(CountingSink::default());
        // Round 1: 3 of 4 popped after 1s, 2s, 3s. Round 2: 1 of 2 after 1s.
        let summary = aggregator.finalize(&session_with(&[3, 1]));

        assert_eq!(summary.total_spawned, 6);
        assert_eq!(summary.round_accuracy, vec![75.0, 50.0]);
        assert_eq!(summary.average_accuracy, 62.5);
        assert_eq!(summary.average_time_to_pop_ms, 1_750.0);
        assert_eq!(summary.time_to_pop_variance, 687_500.0);
        assert_eq!(summary.fastest_pop_ms, Some(1_000));
        assert_eq!(summary.slowest_pop_ms, Some(3_000));
        assert_eq!(summary.balloons_per_second, 0.2);
    }

    #[test]
    fn ties_pick_the_earliest_round() {
        let aggregator = ScoreAggregator::new(CountingSink::default());
        let summary = aggregator.finalize(&session_with(&[3, 3]));
        assert_eq!(summary.best_round, Some(1));
        assert_eq!(summary.worst_round, Some(1));
    }

    #[test]
    fn empty_session_has_no_best_round() {
        let aggregator = ScoreAggregator::new(CountingSink::default());
        let summary = aggregator.finalize(&session_with(&[]));
        assert_eq!(summary.total_score, 0);
        assert_eq!(summary.best_round, None);
        assert_eq!(summary.average_per_round, 0.0);
        assert_eq!(summary.average_accuracy, 0.0);
        assert_eq!(summary.average_time_to_pop_ms, 0.0);
        assert_eq!(summary.fastest_pop_ms, None);
        assert_eq!(summary.balloons_per_second, 0.0);
    }

    #[tokio::test]
    async fn submits_each_session_once() {
        let sink = CountingSink::default();
        let calls = Arc::clone(&sink.calls);
        let mut aggregator = ScoreAggregator::new(sink);
        let summary = aggregator.finalize(&session_with(&[1]));

        aggregator.submit(&summary).await.unwrap();
        let second = aggregator.submit(&summary).await;

        assert_eq!(
            second,
            Err(EngineError::AlreadySubmitted(summary.session_id.clone()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_submission_is_not_retried() {
        let sink = CountingSink {
            fail: true,
            ..CountingSink::default()
        };
        let calls = Arc::clone(&sink.calls);
        let mut aggregator = ScoreAggregator::new(sink);
        let summary = aggregator.finalize(&session_with(&[2, 0]));

        let first = aggregator.submit(&summary).await;
        assert!(matches!(first, Err(EngineError::SubmissionFailed(_))));
        assert!(aggregator.was_submitted(&summary.session_id));

        let again = aggregator.submit(&summary).await;
        assert!(matches!(again, Err(EngineError::AlreadySubmitted(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
