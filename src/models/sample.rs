use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Confidence label reported by the gaze service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    #[serde(alias = "low")]
    Low,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
    #[serde(other)]
    Unknown,
}

/// Either a label or a numeric score, depending on the service build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Confidence {
    Level(ConfidenceLevel),
    Score(f64),
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence::Level(ConfidenceLevel::Medium)
    }
}

/// One gaze estimate, already rescaled to viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub x: f64,
    pub y: f64,
    pub confidence: Confidence,
    pub timestamp_ms: u64,
}

/// Size of the consuming window in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

impl Viewport {
    /// Map a point from a `source` screen resolution into this viewport.
    ///
    /// A non-positive source dimension falls back to the default 1920x1080.
    pub fn rescale(&self, x: f64, y: f64, source_width: f64, source_height: f64) -> (f64, f64) {
        let fallback = Viewport::default();
        let sw = if source_width > 0.0 { source_width } else { fallback.width };
        let sh = if source_height > 0.0 { source_height } else { fallback.height };
        (x / sw * self.width, y / sh * self.height)
    }
}

/// Smoothed pointer position plus the instant the underlying sample arrived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    pub x: f64,
    pub y: f64,
    pub raw_x: f64,
    pub raw_y: f64,
    pub confidence: Confidence,
    pub sampled_at: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_accepts_labels_and_scores() {
        let upper: Confidence = serde_json::from_str("\"HIGH\"").unwrap();
        let lower: Confidence = serde_json::from_str("\"low\"").unwrap();
        let score: Confidence = serde_json::from_str("0.82").unwrap();

        assert_eq!(upper, Confidence::Level(ConfidenceLevel::High));
        assert_eq!(lower, Confidence::Level(ConfidenceLevel::Low));
        assert_eq!(score, Confidence::Score(0.82));
    }

    #[test]
    fn rescale_maps_service_space_into_viewport() {
        let viewport = Viewport {
            width: 960.0,
            height: 540.0,
        };
        let (x, y) = viewport.rescale(1920.0, 1080.0, 3840.0, 2160.0);
        assert!((x - 480.0).abs() < 1e-9);
        assert!((y - 270.0).abs() < 1e-9);
    }

    #[test]
    fn rescale_falls_back_when_service_omits_resolution() {
        let viewport = Viewport::default();
        let (x, y) = viewport.rescale(960.0, 540.0, 0.0, 0.0);
        assert!((x - 960.0).abs() < 1e-9);
        assert!((y - 540.0).abs() < 1e-9);
    }
}
