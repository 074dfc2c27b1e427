use std::collections::VecDeque;

use super::config::SmoothingConfig;
use super::kalman::SignalFilter;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy)]
struct HistoryEntry {
    x: f64,
    y: f64,
    at_ms: u64,
}

/// Turns raw viewport samples into a stable on-screen pointer.
///
/// Per axis: Kalman filter, exponential blend with the raw value,
/// moving-average correction over a short time window, then a pull back
/// toward raw when the eye is moving fast.
pub struct PointerSmoother {
    config: SmoothingConfig,
    filter_x: SignalFilter,
    filter_y: SignalFilter,
    history: VecDeque<HistoryEntry>,
    last_raw: Option<(f64, f64)>,
    last: Option<SmoothedPoint>,
    last_update_ms: Option<u64>,
}

impl PointerSmoother {
    pub fn new(config: SmoothingConfig) -> Self {
        let make_filter = |c: &SmoothingConfig| {
            SignalFilter::new(
                c.process_noise,
                c.measurement_noise,
                c.initial_error_covariance,
            )
        };
        Self {
            filter_x: make_filter(&config),
            filter_y: make_filter(&config),
            history: VecDeque::new(),
            last_raw: None,
            last: None,
            last_update_ms: None,
            config,
        }
    }

    pub fn update(&mut self, raw_x: f64, raw_y: f64, now_ms: u64) -> SmoothedPoint {
        let kx = self.filter_x.filter(raw_x);
        let ky = self.filter_y.filter(raw_y);

        let w = self.config.filter_weight;
        let mut x = kx * w + raw_x * (1.0 - w);
        let mut y = ky * w + raw_y * (1.0 - w);

        self.push_history(raw_x, raw_y, now_ms);
        if self.history.len() >= self.config.history_min_samples.max(1) {
            let n = self.history.len() as f64;
            let avg_x = self.history.iter().map(|h| h.x).sum::<f64>() / n;
            let avg_y = self.history.iter().map(|h| h.y).sum::<f64>() / n;
            let hw = self.config.history_weight;
            x = x * (1.0 - hw) + avg_x * hw;
            y = y * (1.0 - hw) + avg_y * hw;
        }

        if let Some((px, py)) = self.last_raw {
            let velocity = (raw_x - px).hypot(raw_y - py);
            let factor = self.velocity_blend(velocity);
            if factor > 0.0 {
                x = x * (1.0 - factor) + raw_x * factor;
                y = y * (1.0 - factor) + raw_y * factor;
            }
        }

        self.last_raw = Some((raw_x, raw_y));
        self.last_update_ms = Some(now_ms);
        let point = SmoothedPoint { x, y };
        self.last = Some(point);
        point
    }

    /// Forget everything; the next sample reseeds both axis filters.
    pub fn reset(&mut self) {
        self.filter_x.reset(None);
        self.filter_y.reset(None);
        self.history.clear();
        self.last_raw = None;
        self.last = None;
        self.last_update_ms = None;
    }

    pub fn last(&self) -> Option<SmoothedPoint> {
        self.last
    }

    pub fn last_update_ms(&self) -> Option<u64> {
        self.last_update_ms
    }

    fn push_history(&mut self, x: f64, y: f64, now_ms: u64) {
        self.history.push_back(HistoryEntry { x, y, at_ms: now_ms });
        let window = self.config.history_window_ms;
        while let Some(front) = self.history.front() {
            if now_ms.saturating_sub(front.at_ms) >= window {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    fn velocity_blend(&self, velocity: f64) -> f64 {
        let threshold = self.config.velocity_threshold;
        if velocity <= threshold {
            return 0.0;
        }
        let scale = self.config.velocity_scale.max(f64::EPSILON);
        ((velocity - threshold) / scale).min(self.config.max_velocity_blend)
    }
}
