//! Per-feature normalization against the subject's own recent baseline.
//!
//! Each facial metric keeps a bounded rolling history of raw values. A new
//! value is scored by how far it sits from the history minimum relative to
//! the observed range, so stress is judged against recent behaviour rather
//! than an absolute scale.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of raw values retained per feature.
pub const DEFAULT_HISTORY_CAPACITY: usize = 300;

/// Default number of samples required before scoring.
pub const DEFAULT_MIN_SAMPLES: usize = 5;

/// Floor for the history range to avoid dividing by zero.
const RANGE_EPSILON: f64 = 1e-6;

/// Level reported while a feature has no usable baseline.
pub const NEUTRAL_LEVEL: f64 = 0.5;

/// Facial features tracked by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Eyebrow,
    Eyes,
    Mouth,
    Chin,
}

impl Feature {
    pub const ALL: [Feature; 4] = [Feature::Eyebrow, Feature::Eyes, Feature::Mouth, Feature::Chin];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::Eyebrow => "eyebrow",
            Feature::Eyes => "eyes",
            Feature::Mouth => "mouth",
            Feature::Chin => "chin",
        }
    }

    fn index(&self) -> usize {
        match self {
            Feature::Eyebrow => 0,
            Feature::Eyes => 1,
            Feature::Mouth => 2,
            Feature::Chin => 3,
        }
    }
}

/// How a normalized level was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationStatus {
    /// Too few samples or a zero-width range
    Initializing,
    /// The computation produced NaN
    Calculating,
    /// A real score relative to the history
    Scored,
}

/// Output of the normalizer for one raw value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedLevel {
    pub value: f64,
    pub status: NormalizationStatus,
}

impl NormalizedLevel {
    fn neutral(status: NormalizationStatus) -> Self {
        Self {
            value: NEUTRAL_LEVEL,
            status,
        }
    }
}

/// Bounded FIFO of raw metric values.
#[derive(Debug, Clone)]
pub struct FeatureHistory {
    values: VecDeque<f64>,
    capacity: usize,
}

impl FeatureHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, evicting the oldest once at capacity.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn oldest(&self) -> Option<f64> {
        self.values.front().copied()
    }

    /// Minimum and maximum of the retained values.
    pub fn range(&self) -> Option<(f64, f64)> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), &v| (lo.min(v), hi.max(v)),
        ))
    }
}

/// Rolling-window normalizer holding one history per feature.
#[derive(Debug, Clone)]
pub struct FeatureNormalizer {
    histories: [FeatureHistory; 4],
    min_samples: usize,
}

impl FeatureNormalizer {
    pub fn new(capacity: usize, min_samples: usize) -> Self {
        Self {
            histories: [
                FeatureHistory::new(capacity),
                FeatureHistory::new(capacity),
                FeatureHistory::new(capacity),
                FeatureHistory::new(capacity),
            ],
            min_samples,
        }
    }

    /// Record `raw` for `feature` and score it against the history.
    pub fn normalize(&mut self, feature: Feature, raw: f64) -> NormalizedLevel {
        let history = &mut self.histories[feature.index()];
        history.push(raw);

        let Some((min, max)) = history.range() else {
            return NormalizedLevel::neutral(NormalizationStatus::Initializing);
        };
        if history.len() < self.min_samples || max == min {
            return NormalizedLevel::neutral(NormalizationStatus::Initializing);
        }

        let normalized = (raw - min).abs() / (max - min).abs().max(RANGE_EPSILON);
        let value = normalized.tanh().clamp(0.0, 1.0);
        if value.is_nan() {
            return NormalizedLevel::neutral(NormalizationStatus::Calculating);
        }

        NormalizedLevel {
            value,
            status: NormalizationStatus::Scored,
        }
    }

    pub fn history(&self, feature: Feature) -> &FeatureHistory {
        &self.histories[feature.index()]
    }
}

impl Default for FeatureNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_MIN_SAMPLES)
    }
}
