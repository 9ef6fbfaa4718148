//! Stress summary published by the capture pipeline.
//!
//! A summary is immutable once produced and replaces the previous one
//! wholesale; readers never observe a partially updated value.

use serde::{Deserialize, Serialize};

/// Level at or above which a summary is labelled `High`.
pub const HIGH_THRESHOLD: f64 = 0.75;

/// Level at or above which a summary is labelled `Moderate`.
pub const MODERATE_THRESHOLD: f64 = 0.35;

/// Coarse stress classification derived from the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StressLabel {
    Low,
    Moderate,
    High,
}

impl StressLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StressLabel::Low => "Low",
            StressLabel::Moderate => "Moderate",
            StressLabel::High => "High",
        }
    }
}

impl std::fmt::Display for StressLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a level to its label.
pub fn label_for(level: f64) -> StressLabel {
    if level >= HIGH_THRESHOLD {
        StressLabel::High
    } else if level >= MODERATE_THRESHOLD {
        StressLabel::Moderate
    } else {
        StressLabel::Low
    }
}

/// Per-frame stress estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Stress level in [0, 1]
    pub level: f64,
    /// Label derived from `level`
    pub label: StressLabel,
    /// Number of faces reported by the detector
    pub faces: u32,
}

impl Summary {
    /// Build a summary from a level, clamping it and deriving the label.
    pub fn from_level(level: f64, faces: u32) -> Self {
        let level = if level.is_nan() {
            0.0
        } else {
            level.clamp(0.0, 1.0)
        };
        Self {
            level,
            label: label_for(level),
            faces,
        }
    }

    /// Summary for a frame with no detected face.
    pub fn no_face() -> Self {
        Self {
            level: 0.0,
            label: StressLabel::Low,
            faces: 0,
        }
    }

    /// Level expressed as a whole percentage, used by the overlay.
    pub fn percent(&self) -> u32 {
        (self.level.clamp(0.0, 1.0) * 100.0) as u32
    }
}

impl Default for Summary {
    fn default() -> Self {
        Self::no_face()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_boundaries() {
        assert_eq!(label_for(0.75), StressLabel::High);
        assert_eq!(label_for(0.7499), StressLabel::Moderate);
        assert_eq!(label_for(0.35), StressLabel::Moderate);
        assert_eq!(label_for(0.3499), StressLabel::Low);
        assert_eq!(label_for(0.0), StressLabel::Low);
        assert_eq!(label_for(1.0), StressLabel::High);
    }

    #[test]
    fn test_from_level_clamps() {
        let high = Summary::from_level(1.7, 1);
        assert_eq!(high.level, 1.0);
        assert_eq!(high.label, StressLabel::High);

        let low = Summary::from_level(-0.2, 1);
        assert_eq!(low.level, 0.0);
        assert_eq!(low.label, StressLabel::Low);

        let nan = Summary::from_level(f64::NAN, 1);
        assert_eq!(nan.level, 0.0);
    }

    #[test]
    fn test_summary_json_shape() {
        let json = serde_json::to_value(Summary::no_face()).unwrap();
        assert_eq!(json, serde_json::json!({"level": 0.0, "label": "Low", "faces": 0}));
    }

    #[test]
    fn test_percent() {
        assert_eq!(Summary::from_level(0.587, 1).percent(), 58);
        assert_eq!(Summary::from_level(1.0, 1).percent(), 100);
    }
}
