//! Throttled emotion classification with a sticky last label.
//!
//! Expressions change slowly compared to the capture rate, so the
//! classifier only runs every few frames. Between runs, and whenever a run
//! fails, the previous label is kept.

use crate::core::frame::crop_gray;
use crate::core::landmarks::BoundingBox;
use crate::providers::{EmotionClassifier, ModelError, EMOTION_INPUT_SIZE};
use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Default number of frames between classifier runs.
pub const DEFAULT_EMOTION_INTERVAL: u64 = 5;

/// The call counter wraps at this value.
const COUNTER_WRAP: u64 = 1_000_000;

/// Fixed 7-class emotion taxonomy, in classifier output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Angry,
    Disgust,
    Scared,
    Happy,
    Sad,
    Surprised,
    Neutral,
}

impl Emotion {
    pub const TAXONOMY: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Scared,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprised,
        Emotion::Neutral,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Scared => "scared",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprised => "surprised",
            Emotion::Neutral => "neutral",
        }
    }

    /// Emotions that force the stress level up to the high threshold.
    pub fn indicates_stress(&self) -> bool {
        matches!(self, Emotion::Scared | Emotion::Sad)
    }

    /// Pick the class with the highest score.
    pub fn from_scores(scores: &[f32]) -> Result<Emotion, ModelError> {
        if scores.len() != Self::TAXONOMY.len() {
            return Err(ModelError::Inference(format!(
                "expected {} class scores, got {}",
                Self::TAXONOMY.len(),
                scores.len()
            )));
        }
        let (best, _) = scores
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |(bi, bs), (i, &s)| {
                if s > bs {
                    (i, s)
                } else {
                    (bi, bs)
                }
            });
        Ok(Self::TAXONOMY[best])
    }
}

/// Wraps the emotion classifier with throttling and a sticky label.
pub struct EmotionGate {
    classifier: Box<dyn EmotionClassifier>,
    label: Option<Emotion>,
    counter: u64,
    interval: u64,
    failures: u64,
}

impl EmotionGate {
    pub fn new(classifier: Box<dyn EmotionClassifier>, interval: u64) -> Self {
        Self {
            classifier,
            label: None,
            counter: 0,
            interval: interval.max(1),
            failures: 0,
        }
    }

    /// Current sticky label; `None` until the first successful run.
    pub fn label(&self) -> Option<Emotion> {
        self.label
    }

    /// Name of the sticky label, `"unknown"` before the first run.
    pub fn label_name(&self) -> &'static str {
        self.label.map(|e| e.name()).unwrap_or("unknown")
    }

    /// Observe the primary face and return the (possibly sticky) label.
    pub fn observe(&mut self, gray: &GrayImage, face: &BoundingBox) -> Option<Emotion> {
        let Some(crop) = crop_gray(gray, face) else {
            return self.label;
        };

        self.counter = (self.counter + 1) % COUNTER_WRAP;
        if self.counter % self.interval != 0 && self.label.is_some() {
            return self.label;
        }

        match self.classify(&crop) {
            Ok(emotion) => self.label = Some(emotion),
            Err(e) => {
                self.failures += 1;
                if self.failures == 1 || self.failures % 500 == 0 {
                    tracing::warn!(failures = self.failures, "Emotion classification failed: {e}");
                }
            }
        }
        self.label
    }

    fn classify(&mut self, crop: &GrayImage) -> Result<Emotion, ModelError> {
        let input = prepare_input(crop);
        let scores = self.classifier.classify(&input)?;
        Emotion::from_scores(&scores)
    }
}

/// Resize a face crop to the classifier input and scale it to [0, 1].
pub fn prepare_input(crop: &GrayImage) -> Vec<f32> {
    let resized = imageops::resize(
        crop,
        EMOTION_INPUT_SIZE,
        EMOTION_INPUT_SIZE,
        FilterType::Triangle,
    );
    resized.as_raw().iter().map(|&v| v as f32 / 255.0).collect()
}
