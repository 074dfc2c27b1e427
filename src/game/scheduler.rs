//! Round sequencing for one game session.
//!
//! The scheduler is a plain state machine. Each game timer (countdown, round
//! clock, inter-round pause) is a deadline stored inside
//! the current phase, and a single `advance(now, pointer)` call per frame
//! moves the game forward. Nothing here spawns tasks or sleeps, so the whole
//! game can be replayed in tests with synthetic instants.

use chrono::{Duration as ChronoDuration, Utc};
use log::{error, info};
use tokio::time::{Duration, Instant};

use crate::error::{EngineError, EngineResult};
use crate::models::{ChildProfile, PointerSample, PopStat, RoundRecord, RoundResult, Session};
use crate::targets::TargetField;

use super::state::{GameConfig, GameEvent, PhaseKind};

#[derive(Debug, Clone)]
struct ActiveRound {
    index: u32,
    started_at: Instant,
    started_wall: chrono::DateTime<Utc>,
    deadline: Instant,
    hits: u32,
    spawn_base: u64,
    pops: Vec<PopStat>,
    last_hit_at: Option<Instant>,
    /// `sampled_at` of the pointer sample that last scored.
    last_scored_sample: Option<Instant>,
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Countdown { ends_at: Instant, tracking_ready: bool },
    Active(ActiveRound),
    RoundTransition { next_index: u32, ends_at: Instant },
    Finished,
    TrackingUnavailable { reason: String },
}

pub struct RoundScheduler {
    config: GameConfig,
    phase: Phase,
    session: Option<Session>,
    field: TargetField,
    score: u32,
    token: u64,
}

impl RoundScheduler {
    pub fn new(config: GameConfig, field: TargetField) -> Self {
        Self {
            config: GameConfig {
                total_rounds: config.total_rounds.max(1),
                ..config
            },
            phase: Phase::Idle,
            session: None,
            field,
            score: 0,
            token: 0,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Bumped on every phase change; deferred work compares it before acting.
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn phase(&self) -> PhaseKind {
        match self.phase {
            Phase::Idle => PhaseKind::Idle,
            Phase::Countdown { .. } => PhaseKind::Countdown,
            Phase::Active(_) => PhaseKind::Active,
            Phase::RoundTransition { .. } => PhaseKind::RoundTransition,
            Phase::Finished => PhaseKind::Finished,
            Phase::TrackingUnavailable { .. } => PhaseKind::TrackingUnavailable,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.phase,
            Phase::Countdown { .. } | Phase::Active(_) | Phase::RoundTransition { .. }
        )
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn field(&self) -> &TargetField {
        &self.field
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn round_index(&self) -> Option<u32> {
        match &self.phase {
            Phase::Active(round) => Some(round.index),
            Phase::RoundTransition { next_index, .. } => Some(next_index.saturating_sub(1)),
            _ => None,
        }
    }

    pub fn round_hits(&self) -> u32 {
        match &self.phase {
            Phase::Active(round) => round.hits,
            _ => 0,
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.phase {
            Phase::TrackingUnavailable { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        let deadline = match &self.phase {
            Phase::Countdown { ends_at, .. } => *ends_at,
            Phase::Active(round) => round.deadline,
            Phase::RoundTransition { ends_at, .. } => *ends_at,
            _ => return Duration::ZERO,
        };
        deadline.saturating_duration_since(now)
    }

    /// Start a new session. Allowed from `Idle` or after a tracking failure.
    pub fn begin(&mut self, child: ChildProfile, now: Instant) -> EngineResult<Vec<GameEvent>> {
        match self.phase {
            Phase::Idle | Phase::TrackingUnavailable { .. } => {}
            _ => {
                return Err(EngineError::InvalidTransition {
                    from: self.phase().as_str(),
                    action: "start a game",
                })
            }
        }

        let session = Session::new(child, Utc::now());
        let session_id = session.id.clone();
        info!(
            "session {} starting for child {} ({} rounds x {}ms)",
            session_id, session.child.child_id, self.config.total_rounds, self.config.round_duration_ms
        );

        self.session = Some(session);
        self.score = 0;
        self.field.clear();
        self.enter(Phase::Countdown {
            ends_at: now + Duration::from_millis(self.config.countdown_ms),
            tracking_ready: false,
        });

        Ok(vec![GameEvent::CountdownStarted { session_id }])
    }

    /// The camera is up. Ignored unless `token` is still current.
    pub fn tracking_started(&mut self, token: u64) -> bool {
        if token != self.token {
            return false;
        }
        match &mut self.phase {
            Phase::Countdown { tracking_ready, .. } => {
                *tracking_ready = true;
                true
            }
            _ => false,
        }
    }

    /// Tracking could not start or dropped mid-game. The partial session is discarded.
    pub fn tracking_failed(&mut self, reason: impl Into<String>) -> Vec<GameEvent> {
        if !self.is_running() {
            return Vec::new();
        }
        let reason = reason.into();
        error!("tracking unavailable, abandoning session: {}", reason);
        self.session = None;
        self.field.clear();
        self.enter(Phase::TrackingUnavailable {
            reason: reason.clone(),
        });
        vec![GameEvent::TrackingLost { reason }]
    }

    /// Drop everything and return to `Idle`.
    pub fn reset(&mut self) {
        self.session = None;
        self.score = 0;
        self.field.clear();
        self.enter(Phase::Idle);
    }

    /// Move the game forward to `now`, hit-testing `pointer` when a round is live.
    pub fn advance(&mut self, now: Instant, pointer: Option<&PointerSample>) -> Vec<GameEvent> {
        let mut events = Vec::new();

        match self.phase.clone() {
            Phase::Countdown { ends_at, tracking_ready } => {
                if tracking_ready && now >= ends_at {
                    self.start_round(0, now, &mut events);
                }
            }
            Phase::Active(round) => {
                if now >= round.deadline {
                    self.end_round(round, now, &mut events);
                } else {
                    self.play_frame(round, now, pointer, &mut events);
                }
            }
            Phase::RoundTransition { next_index, ends_at } => {
                if now >= ends_at {
                    self.start_round(next_index, now, &mut events);
                }
            }
            Phase::Idle | Phase::Finished | Phase::TrackingUnavailable { .. } => {}
        }

        events
    }

    fn play_frame(
        &mut self,
        mut round: ActiveRound,
        now: Instant,
        pointer: Option<&PointerSample>,
        events: &mut Vec<GameEvent>,
    ) {
        // Samples taken before this round began belong to an earlier phase,
        // and a sample that already scored never scores again.
        let fresh = pointer.filter(|p| {
            p.sampled_at >= round.started_at
                && round.last_scored_sample.map_or(true, |t| p.sampled_at > t)
        });
        let cooldown = Duration::from_millis(self.config.hit_cooldown_ms);
        let cooling = round
            .last_hit_at
            .map_or(false, |t| now.saturating_duration_since(t) < cooldown);

        if let Some(p) = fresh.filter(|_| !cooling) {
            let popped = self.field.hit_test(p.x, p.y, now);
            if !popped.is_empty() {
                round.hits += popped.len() as u32;
                self.score += popped.len() as u32;
                round.last_hit_at = Some(now);
                round.last_scored_sample = Some(p.sampled_at);
                for target in &popped {
                    round.pops.push(PopStat {
                        target_id: target.id,
                        spawned_after_ms: millis_between(round.started_at, target.spawned_at),
                        popped_after_ms: millis_between(round.started_at, now),
                        time_to_pop_ms: millis_between(target.spawned_at, now),
                        distance: target.distance_to(p.x, p.y),
                    });
                    events.push(GameEvent::TargetHit {
                        round_index: round.index,
                        target_id: target.id,
                        score: self.score,
                    });
                }
                self.phase = Phase::Active(round);
            }
        }
        self.field.collect_expired(now);
    }

    fn start_round(&mut self, index: u32, now: Instant, events: &mut Vec<GameEvent>) {
        self.field.clear();
        let spawn_base = self.field.spawned_count();
        let target = self.field.spawn(now);
        let round = ActiveRound {
            index,
            started_at: now,
            started_wall: Utc::now(),
            deadline: now + Duration::from_millis(self.config.round_duration_ms),
            hits: 0,
            spawn_base,
            pops: Vec::new(),
            last_hit_at: None,
            last_scored_sample: None,
        };
        info!("round {} of {} started", index + 1, self.config.total_rounds);
        self.enter(Phase::Active(round));
        events.push(GameEvent::RoundStarted {
            index,
            target_id: target.map(|t| t.id),
        });
    }

    fn end_round(&mut self, round: ActiveRound, now: Instant, events: &mut Vec<GameEvent>) {
        let duration_ms = self.config.round_duration_ms;
        let elapsed_ms = (now.saturating_duration_since(round.started_at).as_millis() as u64).min(duration_ms);
        let record = RoundRecord {
            index: round.index,
            started_at: round.started_wall,
            duration_ms,
            deadline: round.started_wall + ChronoDuration::milliseconds(duration_ms as i64),
            result: RoundResult {
                hits: round.hits,
                elapsed_ms,
            },
            spawned: self.field.spawned_count().saturating_sub(round.spawn_base) as u32,
            pops: round.pops,
        };

        // Leave `Active` before recording so a repeated deadline can never record twice.
        self.field.clear();
        let is_last = round.index + 1 >= self.config.total_rounds;
        if is_last {
            self.enter(Phase::Finished);
        } else {
            self.enter(Phase::RoundTransition {
                next_index: round.index + 1,
                ends_at: now + Duration::from_millis(self.config.transition_ms),
            });
        }

        info!(
            "round {} of {} ended with {} hits",
            round.index + 1,
            self.config.total_rounds,
            round.hits
        );

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Err(err) = session.record_round(record.clone()) {
            error!("dropping round result: {}", err);
            return;
        }
        events.push(GameEvent::RoundEnded { record });

        if is_last {
            if let Err(err) = session.finish(Utc::now()) {
                error!("session already finished: {}", err);
                return;
            }
            info!(
                "session {} finished, total score {}",
                session.id, session.total_score
            );
            events.push(GameEvent::SessionFinished {
                session: session.clone(),
            });
        }
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.token = self.token.wrapping_add(1);
    }
}

fn millis_between(earlier: Instant, later: Instant) -> u64 {
    later.saturating_duration_since(earlier).as_millis() as u64
}
