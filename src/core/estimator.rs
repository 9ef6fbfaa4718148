//! Frame to stress summary estimation.
//!
//! Two strategies exist. The accurate one measures facial landmarks,
//! normalizes each metric against its own history, fuses them with fixed
//! weights, lets a stressed emotion raise the result and smooths it over
//! time. The heuristic one only needs a generic face/eye detector and maps
//! the edge density of the forehead strip to a level.
//!
//! The strategy is chosen once at construction. If the landmark capability
//! reports itself unavailable later, the estimator switches to the
//! heuristic strategy for the rest of the process; it never switches back.

use crate::config::{EstimatorConfig, FusionWeights};
use crate::core::emotion::{Emotion, EmotionGate};
use crate::core::frame::{crop_gray, grayscale, Frame};
use crate::core::landmarks::{BoundingBox, FaceLandmarks, FaceMetrics, Point};
use crate::core::normalizer::{Feature, FeatureNormalizer};
use crate::core::smoothing::ExponentialSmoother;
use crate::core::summary::{Summary, HIGH_THRESHOLD};
use crate::providers::{
    EmotionClassifier, HeuristicFace, HeuristicProvider, LandmarkProvider, ModelError, ProviderSet,
};
use image::imageops;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Level a stressed emotion raises the fused level to.
pub const EMOTION_FLOOR: f64 = HIGH_THRESHOLD;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const MAX_EDGE_NORM: f64 = 3.0;

/// Which strategy is producing summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorMode {
    Accurate,
    Heuristic,
}

/// Model availability, published apart from the estimator so readers never
/// wait for a frame to finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub mode: EstimatorMode,
    pub models_ready: bool,
    pub model_error: Option<String>,
}

/// Shared handle to the published [`ModelStatus`].
pub type SharedModelStatus = Arc<RwLock<ModelStatus>>;

/// Last known face geometry, kept for overlay drawing only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionCache {
    pub face: Option<BoundingBox>,
    pub landmarks: Option<FaceLandmarks>,
}

/// Raise `level` to the emotion floor when the emotion indicates stress.
pub fn apply_emotion_override(level: f64, emotion: Option<Emotion>) -> f64 {
    match emotion {
        Some(e) if e.indicates_stress() => level.max(EMOTION_FLOOR),
        _ => level,
    }
}

/// Weighted sum of the per-feature levels.
pub fn fuse(weights: &FusionWeights, eyebrow: f64, eyes: f64, mouth: f64, chin: f64) -> f64 {
    weights.eyebrow * eyebrow + weights.eyes * eyes + weights.mouth * mouth + weights.chin * chin
}

/// Landmark-based estimator with normalization, emotion gating and smoothing.
pub struct AccurateEstimator {
    landmarks: Box<dyn LandmarkProvider>,
    emotion: EmotionGate,
    normalizer: FeatureNormalizer,
    smoother: ExponentialSmoother,
    weights: FusionWeights,
}

impl AccurateEstimator {
    pub fn new(
        landmarks: Box<dyn LandmarkProvider>,
        classifier: Box<dyn EmotionClassifier>,
        config: &EstimatorConfig,
    ) -> Self {
        Self {
            landmarks,
            emotion: EmotionGate::new(classifier, config.emotion_interval),
            normalizer: FeatureNormalizer::new(config.history_capacity, config.min_samples),
            smoother: ExponentialSmoother::new(config.ema_alpha),
            weights: config.weights.clone(),
        }
    }

    /// Estimate from a grayscale frame, refreshing `cache` when a face is found.
    ///
    /// Frames without a face return the zero summary and leave the
    /// smoothing state untouched.
    pub fn estimate(
        &mut self,
        gray: &GrayImage,
        cache: &mut DetectionCache,
    ) -> Result<Summary, ModelError> {
        let detections = self.landmarks.detect(gray)?;
        let Some(primary) = detections.first() else {
            return Ok(Summary::no_face());
        };
        let faces = detections.len() as u32;

        cache.face = Some(primary.bbox);
        cache.landmarks = Some(primary.landmarks.clone());

        let Some(metrics) = FaceMetrics::measure(primary) else {
            debug!("Primary face has no eyebrow landmarks");
            return Ok(Summary::from_level(0.0, faces));
        };

        let eyebrow = self.normalizer.normalize(Feature::Eyebrow, metrics.eyebrow);
        let eyes = self.normalizer.normalize(Feature::Eyes, metrics.eyes);
        let mouth = self.normalizer.normalize(Feature::Mouth, metrics.mouth);
        let chin = self.normalizer.normalize(Feature::Chin, metrics.chin);
        let fused = fuse(&self.weights, eyebrow.value, eyes.value, mouth.value, chin.value);

        let emotion = self.emotion.observe(gray, &primary.bbox);
        let level = apply_emotion_override(fused, emotion);
        let smoothed = self.smoother.update(level);

        Ok(Summary::from_level(smoothed, faces))
    }

    pub fn emotion_label(&self) -> &'static str {
        self.emotion.label_name()
    }

    pub fn normalizer(&self) -> &FeatureNormalizer {
        &self.normalizer
    }

    pub fn smoothed_level(&self) -> Option<f64> {
        self.smoother.current()
    }
}

/// Edge-density estimator over the forehead strip of a detected face.
pub struct HeuristicEstimator {
    provider: Option<Box<dyn HeuristicProvider>>,
}

impl HeuristicEstimator {
    pub fn new(provider: Option<Box<dyn HeuristicProvider>>) -> Self {
        Self { provider }
    }

    /// Detect faces with the heuristic provider; errors yield no faces.
    pub fn detect(&mut self, gray: &GrayImage) -> Vec<HeuristicFace> {
        let Some(provider) = self.provider.as_mut() else {
            return Vec::new();
        };
        provider.detect(gray).unwrap_or_else(|e| {
            debug!("Heuristic detection failed: {e}");
            Vec::new()
        })
    }

    /// Estimate from already detected faces.
    pub fn estimate_from(gray: &GrayImage, faces: &[HeuristicFace]) -> Summary {
        let Some(primary) = faces.first() else {
            return Summary::no_face();
        };
        let Some(roi) = crop_gray(gray, &primary.face) else {
            return Summary::no_face();
        };
        Summary::from_level(edge_level(&roi, &primary.eyes), faces.len() as u32)
    }
}

/// Map forehead edge density, scaled by eye spacing, to a level.
pub fn edge_level(face: &GrayImage, eyes: &[BoundingBox]) -> f64 {
    let (width, height) = face.dimensions();
    let width_f = width as f64;

    let scale = if eyes.len() >= 2 {
        let mut sorted: Vec<&BoundingBox> = eyes.iter().collect();
        sorted.sort_by_key(|e| e.x);
        let a: Point = sorted[0].center();
        let b: Point = sorted[1].center();
        a.distance(&b).max(1.0)
    } else {
        (width_f * 0.5).max(1.0)
    };

    let strip_height = (height / 5).max(1);
    let strip = imageops::crop_imm(face, 0, 0, width, strip_height).to_image();
    let edges = imageproc::edges::canny(&strip, CANNY_LOW, CANNY_HIGH);
    let pixels = edges.as_raw();
    let density = if pixels.is_empty() {
        0.0
    } else {
        pixels.iter().map(|&v| v as f64).sum::<f64>() / pixels.len() as f64 / 255.0
    };

    let norm = (density * (width_f / scale) * 0.5).clamp(0.0, MAX_EDGE_NORM);
    (-norm).exp().clamp(0.0, 1.0)
}

/// Estimator facade with a one-way downgrade from accurate to heuristic.
pub struct StressEstimator {
    accurate: Option<AccurateEstimator>,
    heuristic: HeuristicEstimator,
    cache: DetectionCache,
    heuristic_faces: Option<Vec<HeuristicFace>>,
    model_error: Option<String>,
    status: SharedModelStatus,
}

impl StressEstimator {
    pub fn new(providers: ProviderSet, config: &EstimatorConfig) -> Self {
        let ProviderSet {
            landmarks,
            emotion,
            heuristic,
        } = providers;

        let (accurate, model_error) = match (landmarks, emotion) {
            (Ok(landmarks), Ok(classifier)) => (
                Some(AccurateEstimator::new(landmarks, classifier, config)),
                None,
            ),
            (Err(e), _) | (_, Err(e)) => (None, Some(e.to_string())),
        };

        let status = Arc::new(RwLock::new(ModelStatus {
            mode: if accurate.is_some() {
                EstimatorMode::Accurate
            } else {
                EstimatorMode::Heuristic
            },
            models_ready: accurate.is_some(),
            model_error: model_error.clone(),
        }));

        let estimator = Self {
            accurate,
            heuristic: HeuristicEstimator::new(heuristic),
            cache: DetectionCache::default(),
            heuristic_faces: None,
            model_error,
            status,
        };
        info!(mode = ?estimator.mode(), "Stress estimator ready");
        estimator
    }

    /// Handle to the model status, updated when the estimator downgrades.
    pub fn status_handle(&self) -> SharedModelStatus {
        self.status.clone()
    }

    fn publish_status(&self) {
        let status = ModelStatus {
            mode: self.mode(),
            models_ready: self.models_ready(),
            model_error: self.model_error.clone(),
        };
        match self.status.write() {
            Ok(mut guard) => *guard = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }

    pub fn mode(&self) -> EstimatorMode {
        if self.accurate.is_some() {
            EstimatorMode::Accurate
        } else {
            EstimatorMode::Heuristic
        }
    }

    pub fn models_ready(&self) -> bool {
        self.accurate.is_some()
    }

    pub fn model_error(&self) -> Option<&str> {
        self.model_error.as_deref()
    }

    pub fn accurate(&self) -> Option<&AccurateEstimator> {
        self.accurate.as_ref()
    }

    pub fn detection_cache(&self) -> &DetectionCache {
        &self.cache
    }

    /// Estimate a summary for an RGB frame.
    pub fn estimate(&mut self, frame: &Frame) -> Summary {
        self.estimate_gray(&grayscale(frame))
    }

    /// Estimate a summary for a grayscale frame.
    pub fn estimate_gray(&mut self, gray: &GrayImage) -> Summary {
        self.heuristic_faces = None;

        if let Some(accurate) = self.accurate.as_mut() {
            match accurate.estimate(gray, &mut self.cache) {
                Ok(summary) => return summary,
                Err(e @ ModelError::Unavailable(_)) => {
                    warn!("Landmark pipeline unavailable, using heuristic estimates from now on: {e}");
                    self.model_error = Some(e.to_string());
                    self.accurate = None;
                    self.publish_status();
                }
                Err(e) => debug!("Landmark inference failed for this frame: {e}"),
            }
        }

        let faces = self.heuristic.detect(gray);
        let summary = HeuristicEstimator::estimate_from(gray, &faces);
        self.heuristic_faces = Some(faces);
        summary
    }

    /// Geometry to draw for the frame just estimated.
    ///
    /// Uses cached landmarks when any were ever found, otherwise the
    /// heuristic detector's first face (reusing this frame's detection when
    /// the heuristic path already ran).
    pub fn overlay_detections(&mut self, gray: &GrayImage) -> DetectionCache {
        if self.cache.face.is_some() {
            return self.cache.clone();
        }
        let faces = match self.heuristic_faces.take() {
            Some(faces) => faces,
            None => self.heuristic.detect(gray),
        };
        DetectionCache {
            face: faces.first().map(|f| f.face),
            landmarks: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::emotion::tests::FixedClassifier;
    use crate::core::landmarks::tests::synthetic_face;
    use crate::core::landmarks::FaceDetection;
    use crate::core::summary::StressLabel;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Landmark provider replaying scripted results.
    struct ScriptedLandmarks {
        script: Arc<Mutex<VecDeque<Result<Vec<FaceDetection>, ModelError>>>>,
    }

    impl LandmarkProvider for ScriptedLandmarks {
        fn detect(&mut self, _gray: &GrayImage) -> Result<Vec<FaceDetection>, ModelError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    struct FixedHeuristic(Vec<HeuristicFace>);

    impl HeuristicProvider for FixedHeuristic {
        fn detect(&mut self, _gray: &GrayImage) -> Result<Vec<HeuristicFace>, ModelError> {
            Ok(self.0.clone())
        }
    }

    fn face_with_eyebrow_gap(gap: f64) -> FaceDetection {
        let mut face = synthetic_face();
        let mut points = face.landmarks.points().to_vec();
        points[22] = Point::new(points[21].x + gap, points[22].y);
        face.landmarks = FaceLandmarks::new(points);
        face
    }

    fn accurate_estimator(
        script: Vec<Result<Vec<FaceDetection>, ModelError>>,
        emotion: Option<Emotion>,
    ) -> StressEstimator {
        let (classifier, _) = FixedClassifier::boxed(emotion);
        let providers = ProviderSet {
            landmarks: Ok(Box::new(ScriptedLandmarks {
                script: Arc::new(Mutex::new(script.into())),
            })),
            emotion: Ok(classifier),
            heuristic: Some(Box::new(FixedHeuristic(vec![HeuristicFace {
                face: BoundingBox::new(0, 0, 40, 40),
                eyes: Vec::new(),
            }]))),
        };
        StressEstimator::new(providers, &EstimatorConfig::default())
    }

    #[test]
    fn test_fuse_weights() {
        let weights = FusionWeights::default();
        assert!((fuse(&weights, 1.0, 1.0, 1.0, 1.0) - 1.0).abs() < 1e-12);
        assert!((fuse(&weights, 1.0, 0.0, 0.0, 0.0) - 0.35).abs() < 1e-12);
        assert!((fuse(&weights, 0.0, 0.0, 0.0, 1.0) - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_emotion_override() {
        assert_eq!(apply_emotion_override(0.2, Some(Emotion::Scared)), 0.75);
        assert_eq!(apply_emotion_override(0.5, Some(Emotion::Sad)), 0.75);
        assert_eq!(apply_emotion_override(0.9, Some(Emotion::Sad)), 0.9);
        assert_eq!(apply_emotion_override(0.2, Some(Emotion::Happy)), 0.2);
        assert_eq!(apply_emotion_override(0.2, None), 0.2);
    }

    #[test]
    fn test_initializing_features_fuse_to_half() {
        let mut estimator = accurate_estimator(vec![Ok(vec![synthetic_face()])], Some(Emotion::Neutral));
        let summary = estimator.estimate_gray(&GrayImage::new(100, 100));
        assert!((summary.level - 0.5).abs() < 1e-12);
        assert_eq!(summary.label, StressLabel::Moderate);
        assert_eq!(summary.faces, 1);
        assert_eq!(estimator.mode(), EstimatorMode::Accurate);
    }

    #[test]
    fn test_stressed_emotion_raises_level() {
        let mut estimator = accurate_estimator(vec![Ok(vec![synthetic_face()])], Some(Emotion::Scared));
        let summary = estimator.estimate_gray(&GrayImage::new(100, 100));
        assert!((summary.level - 0.75).abs() < 1e-12);
        assert_eq!(summary.label, StressLabel::High);
    }

    #[test]
    fn test_faces_counts_all_detections() {
        let detections = vec![synthetic_face(), synthetic_face(), synthetic_face()];
        let mut estimator = accurate_estimator(vec![Ok(detections)], Some(Emotion::Neutral));
        assert_eq!(estimator.estimate_gray(&GrayImage::new(100, 100)).faces, 3);
    }

    #[test]
    fn test_zero_faces_leaves_smoothing_untouched() {
        let mut script = vec![Ok(vec![synthetic_face()]); 6];
        script.push(Ok(Vec::new()));
        let mut estimator = accurate_estimator(script, Some(Emotion::Neutral));
        let gray = GrayImage::new(100, 100);

        for _ in 0..6 {
            estimator.estimate_gray(&gray);
        }
        let before = estimator.accurate().and_then(|a| a.smoothed_level());

        let summary = estimator.estimate_gray(&gray);
        assert_eq!(summary, Summary::no_face());
        assert_eq!(estimator.accurate().and_then(|a| a.smoothed_level()), before);
        // The overlay keeps drawing the last known face
        assert!(estimator.detection_cache().face.is_some());
    }

    #[test]
    fn test_varying_metrics_stay_in_range() {
        let script: Vec<_> = (0..20)
            .map(|i| Ok(vec![face_with_eyebrow_gap(5.0 + (i % 7) as f64 * 4.0)]))
            .collect();
        let mut estimator = accurate_estimator(script, Some(Emotion::Neutral));
        let gray = GrayImage::new(100, 100);
        for _ in 0..20 {
            let summary = estimator.estimate_gray(&gray);
            assert!((0.0..=1.0).contains(&summary.level));
        }
        let history = estimator.accurate().unwrap().normalizer().history(Feature::Eyebrow);
        assert_eq!(history.len(), 20);
    }

    #[test]
    fn test_unavailable_landmarks_downgrade_permanently() {
        let script = vec![
            Err(ModelError::Unavailable("predictor gone".to_string())),
            Ok(vec![synthetic_face()]),
        ];
        let mut estimator = accurate_estimator(script, Some(Emotion::Neutral));
        let status = estimator.status_handle();
        assert_eq!(status.read().unwrap().mode, EstimatorMode::Accurate);
        let gray = GrayImage::new(100, 100);

        let summary = estimator.estimate_gray(&gray);
        assert_eq!(summary.faces, 1);
        assert_eq!(estimator.mode(), EstimatorMode::Heuristic);
        assert_eq!(
            *status.read().unwrap(),
            ModelStatus {
                mode: EstimatorMode::Heuristic,
                models_ready: false,
                model_error: Some("Model unavailable: predictor gone".to_string()),
            }
        );
        assert!(!estimator.models_ready());
        assert_eq!(
            estimator.model_error(),
            Some("Model unavailable: predictor gone")
        );

        estimator.estimate_gray(&gray);
        assert_eq!(estimator.mode(), EstimatorMode::Heuristic);
    }

    #[test]
    fn test_missing_classifier_selects_heuristic() {
        let providers = ProviderSet {
            landmarks: Ok(Box::new(ScriptedLandmarks {
                script: Arc::new(Mutex::new(VecDeque::new())),
            })),
            emotion: Err(ModelError::Unavailable("no emotion model".to_string())),
            heuristic: None,
        };
        let mut estimator = StressEstimator::new(providers, &EstimatorConfig::default());
        assert_eq!(estimator.mode(), EstimatorMode::Heuristic);
        assert_eq!(estimator.model_error(), Some("Model unavailable: no emotion model"));
        assert_eq!(estimator.estimate_gray(&GrayImage::new(10, 10)), Summary::no_face());
    }

    #[test]
    fn test_edge_level_flat_face_is_high() {
        // No edges at all: norm 0, exp(0) = 1
        let face = GrayImage::new(60, 60);
        assert!((edge_level(&face, &[]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_edge_level_textured_face_is_lower() {
        let face = GrayImage::from_fn(60, 60, |x, _| image::Luma([if (x / 3) % 2 == 0 { 0 } else { 255 }]));
        let level = edge_level(&face, &[]);
        assert!(level < 1.0);
        assert!(level >= (-MAX_EDGE_NORM).exp());
    }

    fn striped_face() -> GrayImage {
        GrayImage::from_fn(60, 60, |x, _| image::Luma([if (x / 3) % 2 == 0 { 0 } else { 255 }]))
    }

    fn strip_edge_density(face: &GrayImage) -> f64 {
        let (width, height) = face.dimensions();
        let strip = imageops::crop_imm(face, 0, 0, width, height / 5).to_image();
        let edges = imageproc::edges::canny(&strip, CANNY_LOW, CANNY_HIGH);
        let raw = edges.as_raw();
        raw.iter().map(|&v| v as f64).sum::<f64>() / raw.len() as f64 / 255.0
    }

    #[test]
    fn test_edge_level_scales_by_two_leftmost_eyes() {
        let face = striped_face();
        let density = strip_edge_density(&face);
        assert!(density > 0.0);

        // Centres at x = 10, 20 and 45; listed out of order
        let eyes = [
            BoundingBox::new(40, 10, 10, 10),
            BoundingBox::new(15, 10, 10, 10),
            BoundingBox::new(5, 10, 10, 10),
        ];
        let expected = (-(density * (60.0 / 10.0) * 0.5).clamp(0.0, MAX_EDGE_NORM)).exp();
        assert!((edge_level(&face, &eyes) - expected).abs() < 1e-12);

        // Eye spacing equal to half the width matches the one-eye fallback
        let spaced = [BoundingBox::new(5, 10, 10, 10), BoundingBox::new(35, 10, 10, 10)];
        let fallback = (-(density * 2.0 * 0.5).clamp(0.0, MAX_EDGE_NORM)).exp();
        assert!((edge_level(&face, &spaced) - fallback).abs() < 1e-12);
        assert!((edge_level(&face, &spaced[..1]) - fallback).abs() < 1e-12);
    }

    #[test]
    fn test_edge_level_coincident_eyes_use_unit_scale() {
        let face = striped_face();
        let density = strip_edge_density(&face);
        let eyes = [BoundingBox::new(20, 10, 10, 10), BoundingBox::new(20, 10, 10, 10)];
        let expected = (-(density * 60.0 * 0.5).clamp(0.0, MAX_EDGE_NORM)).exp();
        assert!((edge_level(&face, &eyes) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_heuristic_overlay_reuses_frame_detection() {
        let providers = ProviderSet {
            landmarks: Err(ModelError::Unavailable("none".to_string())),
            emotion: Err(ModelError::Unavailable("none".to_string())),
            heuristic: Some(Box::new(FixedHeuristic(vec![HeuristicFace {
                face: BoundingBox::new(5, 5, 30, 30),
                eyes: vec![BoundingBox::new(2, 5, 6, 6), BoundingBox::new(20, 5, 6, 6)],
            }]))),
        };
        let mut estimator = StressEstimator::new(providers, &EstimatorConfig::default());
        let gray = GrayImage::new(64, 64);
        let summary = estimator.estimate_gray(&gray);
        assert_eq!(summary.faces, 1);

        let overlay = estimator.overlay_detections(&gray);
        assert_eq!(overlay.face, Some(BoundingBox::new(5, 5, 30, 30)));
        assert!(overlay.landmarks.is_none());
    }
}
