//! Spawning and hit-testing of on-screen balloons.
//!
//! The field keeps at most one `Live` target. A hit flips the target to
//! `Popping` and places its replacement before `hit_test` returns, so a
//! reader never observes an empty field mid-round.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

use crate::models::Viewport;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetConfig {
    /// Visual radius in px.
    pub target_radius: f64,
    /// Hit distance in px, deliberately larger than `target_radius`.
    pub collision_radius: f64,
    /// Extra inset from the viewport edges in px.
    pub margin: f64,
    pub pop_duration_ms: u64,
    /// Preferred minimum distance between a new target and the last popped one.
    pub min_spawn_distance: f64,
    pub spawn_attempts: u32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            target_radius: 70.0,
            collision_radius: 200.0,
            margin: 25.0,
            pop_duration_ms: 1_000,
            min_spawn_distance: 300.0,
            spawn_attempts: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Live,
    Popping { started_at: Instant },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub spawned_at: Instant,
    pub state: TargetState,
}

impl Target {
    pub fn is_live(&self) -> bool {
        matches!(self.state, TargetState::Live)
    }

    pub fn pop_started_at(&self) -> Option<Instant> {
        match self.state {
            TargetState::Popping { started_at } => Some(started_at),
            TargetState::Live => None,
        }
    }

    pub fn distance_to(&self, px: f64, py: f64) -> f64 {
        (px - self.x).hypot(py - self.y)
    }
}

pub struct TargetField {
    config: TargetConfig,
    viewport: Viewport,
    targets: Vec<Target>,
    next_id: u64,
    last_pop: Option<(f64, f64)>,
    rng: StdRng,
}

impl TargetField {
    pub fn new(config: TargetConfig, viewport: Viewport) -> Self {
        Self::with_rng(config, viewport, StdRng::from_entropy())
    }

    pub fn with_seed(config: TargetConfig, viewport: Viewport, seed: u64) -> Self {
        Self::with_rng(config, viewport, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: TargetConfig, viewport: Viewport, rng: StdRng) -> Self {
        Self {
            config,
            viewport,
            targets: Vec::new(),
            next_id: 1,
            last_pop: None,
            rng,
        }
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Place a new live target. Returns `None` when one is already live.
    pub fn spawn(&mut self, now: Instant) -> Option<Target> {
        if self.live_count() > 0 {
            return None;
        }

        let (x, y) = self.pick_position();
        let target = Target {
            id: self.next_id,
            x,
            y,
            radius: self.config.target_radius,
            spawned_at: now,
            state: TargetState::Live,
        };
        self.next_id += 1;
        self.targets.push(target.clone());
        Some(target)
    }

    /// Pop every live target within the collision radius of the pointer.
    ///
    /// Returns the popped targets; the caller adds `len()` to its score.
    pub fn hit_test(&mut self, px: f64, py: f64, now: Instant) -> Vec<Target> {
        if !px.is_finite() || !py.is_finite() {
            return Vec::new();
        }

        let radius = self.config.collision_radius;
        let mut popped = Vec::new();
        for target in self.targets.iter_mut().filter(|t| t.is_live()) {
            if target.distance_to(px, py) <= radius {
                target.state = TargetState::Popping { started_at: now };
                popped.push(target.clone());
            }
        }

        if let Some(last) = popped.last() {
            self.last_pop = Some((last.x, last.y));
            self.spawn(now);
        }
        popped
    }

    /// Drop popping targets whose animation window has elapsed.
    pub fn collect_expired(&mut self, now: Instant) -> usize {
        let window = Duration::from_millis(self.config.pop_duration_ms);
        let before = self.targets.len();
        self.targets.retain(|t| match t.state {
            TargetState::Live => true,
            TargetState::Popping { started_at } => now.saturating_duration_since(started_at) < window,
        });
        before - self.targets.len()
    }

    pub fn clear(&mut self) {
        self.targets.clear();
        self.last_pop = None;
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn live_target(&self) -> Option<&Target> {
        self.targets.iter().find(|t| t.is_live())
    }

    /// Targets spawned over the field's lifetime; `clear` does not reset it.
    pub fn spawned_count(&self) -> u64 {
        self.next_id - 1
    }

    pub fn live_count(&self) -> usize {
        self.targets.iter().filter(|t| t.is_live()).count()
    }

    fn pick_position(&mut self) -> (f64, f64) {
        let inset = self.config.margin + self.config.target_radius;
        let (min_x, max_x) = axis_range(inset, self.viewport.width);
        let (min_y, max_y) = axis_range(inset, self.viewport.height);

        let mut candidate = (min_x, min_y);
        for _ in 0..self.config.spawn_attempts.max(1) {
            candidate = (
                sample(&mut self.rng, min_x, max_x),
                sample(&mut self.rng, min_y, max_y),
            );
            match self.last_pop {
                Some((lx, ly))
                    if (candidate.0 - lx).hypot(candidate.1 - ly) < self.config.min_spawn_distance => {}
                _ => break,
            }
        }
        candidate
    }
}

// A viewport smaller than twice the inset collapses to its center line.
fn axis_range(inset: f64, extent: f64) -> (f64, f64) {
    if extent - inset > inset {
        (inset, extent - inset)
    } else {
        (extent / 2.0, extent / 2.0)
    }
}

fn sample(rng: &mut StdRng, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(seed: u64) -> TargetField {
        TargetField::with_seed(TargetConfig::default(), Viewport::default(), seed)
    }

    #[test]
    fn spawn_refuses_second_live_target() {
        let mut field = field(7);
        let now = Instant::now();
        assert!(field.spawn(now).is_some());
        assert!(field.spawn(now).is_none());
        assert_eq!(field.live_count(), 1);
    }

    #[test]
    fn spawned_targets_stay_inside_viewport() {
        let config = TargetConfig::default();
        let inset = config.margin + config.target_radius;
        let mut field = field(42);
        let now = Instant::now();

        for _ in 0..200 {
            let target = field.spawn(now).unwrap();
            assert!(target.x >= inset && target.x <= 1920.0 - inset);
            assert!(target.y >= inset && target.y <= 1080.0 - inset);
            field.clear();
        }
    }

    #[test]
    fn center_hit_pops_and_respawns() {
        let mut field = field(3);
        let now = Instant::now();
        let target = field.spawn(now).unwrap();

        let popped = field.hit_test(target.x, target.y, now);
        assert_eq!(popped.len(), 1);
        assert_eq!(popped[0].id, target.id);
        assert_eq!(popped[0].pop_started_at(), Some(now));

        let live = field.live_target().unwrap();
        assert_ne!(live.id, target.id);
        assert_eq!(field.live_count(), 1);
        assert_eq!(field.targets().len(), 2);
    }

    #[test]
    fn pointer_outside_collision_radius_never_hits() {
        let mut field = field(11);
        let now = Instant::now();
        let target = field.spawn(now).unwrap();
        let radius = field.config().collision_radius;

        let popped = field.hit_test(target.x + radius + 0.5, target.y, now);
        assert!(popped.is_empty());
        let edge = field.hit_test(target.x, target.y + radius, now);
        assert_eq!(edge.len(), 1);
    }

    #[test]
    fn popping_targets_are_ignored_and_collected() {
        let mut field = field(5);
        let start = Instant::now();
        let target = field.spawn(start).unwrap();
        field.hit_test(target.x, target.y, start);

        // The popped balloon is not hit again even if the pointer stays put,
        // unless the replacement happens to sit within reach.
        let replacement = field.live_target().unwrap().clone();
        let again = field.hit_test(target.x, target.y, start);
        assert!(again.iter().all(|t| t.id != target.id));
        if again.is_empty() {
            assert_eq!(field.live_target().unwrap().id, replacement.id);
        }

        assert_eq!(field.collect_expired(start + Duration::from_millis(500)), 0);
        let removed = field.collect_expired(start + Duration::from_millis(1_000));
        assert!(removed >= 1);
        assert!(field.targets().iter().all(|t| t.is_live()));
    }

    #[test]
    fn replacement_keeps_distance_from_last_pop() {
        let mut field = field(99);
        let now = Instant::now();
        for _ in 0..50 {
            let target = field.live_target().cloned().or_else(|| field.spawn(now)).unwrap();
            field.hit_test(target.x, target.y, now);
            let next = field.live_target().unwrap();
            assert!(next.distance_to(target.x, target.y) >= 300.0);
            field.collect_expired(now + Duration::from_secs(2));
        }
    }

    #[test]
    fn non_finite_pointer_is_ignored() {
        let mut field = field(1);
        let now = Instant::now();
        field.spawn(now);
        assert!(field.hit_test(f64::NAN, 10.0, now).is_empty());
        assert_eq!(field.live_count(), 1);
    }

    #[test]
    fn spawned_count_includes_replacements() {
        let mut field = field(9);
        let now = Instant::now();
        let first = field.spawn(now).unwrap();
        field.hit_test(first.x, first.y, now);
        assert_eq!(field.spawned_count(), 2);

        field.clear();
        assert_eq!(field.spawned_count(), 2);
    }
}
