//! Session and round records owned by the round scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Who is playing, plus the consent flags carried into the result payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChildProfile {
    pub child_id: String,
    pub age: u32,
    pub school_task_id: Option<String>,
    pub tournament_id: Option<i64>,
    pub is_training_allowed: bool,
    pub suspected_asd: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub hits: u32,
    pub elapsed_ms: u64,
}

/// One popped balloon, timed from the start of its round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PopStat {
    pub target_id: u64,
    pub spawned_after_ms: u64,
    pub popped_after_ms: u64,
    pub time_to_pop_ms: u64,
    /// Pointer distance from the balloon center at the moment of the hit.
    pub distance: f64,
}

/// A finished round. Never mutated after it is appended to a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    pub index: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub deadline: DateTime<Utc>,
    pub result: RoundResult,
    /// Balloons shown during the round, including the one still live at the end.
    #[serde(default)]
    pub spawned: u32,
    #[serde(default)]
    pub pops: Vec<PopStat>,
}

impl RoundRecord {
    /// Popped over spawned, as a percentage.
    pub fn accuracy(&self) -> f64 {
        if self.spawned == 0 {
            return 0.0;
        }
        f64::from(self.result.hits) / f64::from(self.spawned) * 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub child: ChildProfile,
    pub rounds: Vec<RoundRecord>,
    pub total_score: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(child: ChildProfile, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            child,
            rounds: Vec::new(),
            total_score: 0,
            started_at,
            ended_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Append a round to the log.
    ///
    /// Rejects a second record for the same index and any write after the
    /// session has ended.
    pub fn record_round(&mut self, record: RoundRecord) -> EngineResult<()> {
        if self.is_finished() {
            return Err(EngineError::InvalidTransition {
                from: "finished",
                action: "record a round",
            });
        }
        if self.rounds.iter().any(|r| r.index == record.index) {
            return Err(EngineError::DuplicateRound(record.index));
        }
        self.total_score += record.result.hits;
        self.rounds.push(record);
        Ok(())
    }

    /// Stamp `ended_at`. Only the first call has any effect.
    pub fn finish(&mut self, ended_at: DateTime<Utc>) -> EngineResult<()> {
        if self.is_finished() {
            return Err(EngineError::InvalidTransition {
                from: "finished",
                action: "finish the session",
            });
        }
        self.ended_at = Some(ended_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u32, hits: u32) -> RoundRecord {
        let now = Utc::now();
        RoundRecord {
            index,
            started_at: now,
            duration_ms: 5_000,
            deadline: now,
            result: RoundResult {
                hits,
                elapsed_ms: 5_000,
            },
            spawned: hits + 1,
            pops: Vec::new(),
        }
    }

    #[test]
    fn rounds_are_append_only_and_unique() {
        let mut session = Session::new(ChildProfile::default(), Utc::now());
        session.record_round(record(0, 2)).unwrap();
        session.record_round(record(1, 1)).unwrap();

        assert_eq!(
            session.record_round(record(1, 7)),
            Err(EngineError::DuplicateRound(1))
        );
        assert_eq!(session.rounds.len(), 2);
        assert_eq!(session.total_score, 3);
    }

    #[test]
    fn finished_session_rejects_further_writes() {
        let mut session = Session::new(ChildProfile::default(), Utc::now());
        session.record_round(record(0, 1)).unwrap();
        session.finish(Utc::now()).unwrap();

        assert!(session.finish(Utc::now()).is_err());
        assert!(session.record_round(record(1, 1)).is_err());
        assert_eq!(session.rounds.len(), 1);
    }

    #[test]
    fn accuracy_is_popped_over_spawned() {
        let mut round = record(0, 3);
        round.spawned = 4;
        assert_eq!(round.accuracy(), 75.0);

        round.spawned = 0;
        assert_eq!(round.accuracy(), 0.0);
    }
}
