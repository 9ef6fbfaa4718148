//! External model capabilities used by the stress estimator.
//!
//! The landmark detector, the general-purpose face/eye detector and the
//! emotion classifier are treated as black boxes with fixed call
//! contracts. Concrete backends live behind cargo features:
//!
//! - `opencv`: Haar cascades for faces/eyes, LBF facemark for landmarks,
//!   and the `VideoCapture` camera backend
//! - `onnx`: emotion classifier running on ONNX Runtime
//!
//! Without those features every capability reports [`ModelError::Unavailable`]
//! and the pipeline runs on whatever is injected by the caller.

use crate::config::ModelConfig;
use crate::core::landmarks::{BoundingBox, FaceDetection, FaceLandmarks, Point};
use image::GrayImage;

#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "opencv")]
pub mod cv;

/// Side length of the square emotion classifier input.
pub const EMOTION_INPUT_SIZE: u32 = 64;

/// Cascade scan parameters shared by the face and eye detectors.
pub const CASCADE_SCALE_FACTOR: f64 = 1.1;
pub const CASCADE_MIN_NEIGHBORS: i32 = 4;
/// Smallest face and eye the cascades report, in pixels.
pub const FACE_MIN_SIZE: i32 = 64;
pub const EYE_MIN_SIZE: i32 = 20;

/// Errors reported by model capabilities.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The capability is missing or failed to initialize
    Unavailable(String),
    /// A single inference call failed
    Inference(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::Unavailable(e) => write!(f, "Model unavailable: {e}"),
            ModelError::Inference(e) => write!(f, "Inference failed: {e}"),
        }
    }
}

impl std::error::Error for ModelError {}

/// Detects faces and their 68-point landmarks on a grayscale frame.
pub trait LandmarkProvider: Send {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceDetection>, ModelError>;
}

/// A face found by the general-purpose detector.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicFace {
    /// Face box in frame coordinates
    pub face: BoundingBox,
    /// Eye boxes relative to the face box origin
    pub eyes: Vec<BoundingBox>,
}

/// Pair detected face boxes with the landmark shapes fitted to them.
///
/// A fit that reports failure for faces that were found is an inference
/// error, so the frame falls back to the heuristic estimate instead of
/// reporting no faces.
pub fn pair_landmarks(
    faces: Vec<BoundingBox>,
    shapes: Vec<Vec<Point>>,
    fitted: bool,
) -> Result<Vec<FaceDetection>, ModelError> {
    if faces.is_empty() {
        return Ok(Vec::new());
    }
    if !fitted {
        return Err(ModelError::Inference(format!(
            "landmark fit failed for {} face(s)",
            faces.len()
        )));
    }
    Ok(faces
        .into_iter()
        .zip(shapes)
        .map(|(bbox, shape)| FaceDetection {
            bbox,
            landmarks: FaceLandmarks::new(shape),
        })
        .collect())
}

/// General-purpose face and eye detector used when landmarks are unavailable.
pub trait HeuristicProvider: Send {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<HeuristicFace>, ModelError>;
}

/// Classifies a normalized 64x64 face crop into the emotion taxonomy.
pub trait EmotionClassifier: Send {
    /// `input` holds `EMOTION_INPUT_SIZE^2` row-major values in [0, 1].
    /// Returns one score per class in taxonomy order.
    fn classify(&mut self, input: &[f32]) -> Result<Vec<f32>, ModelError>;
}

/// The capabilities available to an estimator, resolved once at startup.
pub struct ProviderSet {
    pub landmarks: Result<Box<dyn LandmarkProvider>, ModelError>,
    pub emotion: Result<Box<dyn EmotionClassifier>, ModelError>,
    pub heuristic: Option<Box<dyn HeuristicProvider>>,
}

impl ProviderSet {
    /// A set with no accurate capabilities and no heuristic detector.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            landmarks: Err(ModelError::Unavailable(reason.clone())),
            emotion: Err(ModelError::Unavailable(reason)),
            heuristic: None,
        }
    }

    /// Load the backends compiled into this build from the configured paths.
    pub fn from_config(models: &ModelConfig) -> Self {
        let landmarks = load_landmarks(models);
        let emotion = load_emotion(models);
        let heuristic = load_heuristic(models);

        if let Err(ref e) = landmarks {
            tracing::warn!("Landmark provider: {e}");
        }
        if let Err(ref e) = emotion {
            tracing::warn!("Emotion classifier: {e}");
        }
        if heuristic.is_none() {
            tracing::warn!("No heuristic face detector available");
        }

        Self {
            landmarks,
            emotion,
            heuristic,
        }
    }

    /// Whether both accurate capabilities loaded.
    pub fn accurate_ready(&self) -> bool {
        self.landmarks.is_ok() && self.emotion.is_ok()
    }
}

#[cfg(feature = "opencv")]
fn load_landmarks(models: &ModelConfig) -> Result<Box<dyn LandmarkProvider>, ModelError> {
    let (Some(cascade), Some(model)) = (&models.face_cascade, &models.landmark_model) else {
        return Err(ModelError::Unavailable(
            "face_cascade and landmark_model must both be configured".to_string(),
        ));
    };
    let provider = cv::FacemarkProvider::load(cascade, model)?;
    Ok(Box::new(provider))
}

#[cfg(not(feature = "opencv"))]
fn load_landmarks(_models: &ModelConfig) -> Result<Box<dyn LandmarkProvider>, ModelError> {
    Err(ModelError::Unavailable(
        "built without the `opencv` feature".to_string(),
    ))
}

#[cfg(feature = "onnx")]
fn load_emotion(models: &ModelConfig) -> Result<Box<dyn EmotionClassifier>, ModelError> {
    let Some(path) = &models.emotion_model else {
        return Err(ModelError::Unavailable(
            "emotion_model is not configured".to_string(),
        ));
    };
    Ok(Box::new(onnx::OnnxEmotionClassifier::load(path)?))
}

#[cfg(not(feature = "onnx"))]
fn load_emotion(_models: &ModelConfig) -> Result<Box<dyn EmotionClassifier>, ModelError> {
    Err(ModelError::Unavailable(
        "built without the `onnx` feature".to_string(),
    ))
}

#[cfg(feature = "opencv")]
fn load_heuristic(models: &ModelConfig) -> Option<Box<dyn HeuristicProvider>> {
    let (Some(face), Some(eye)) = (&models.face_cascade, &models.eye_cascade) else {
        return None;
    };
    match cv::HaarProvider::load(face, eye) {
        Ok(provider) => Some(Box::new(provider)),
        Err(e) => {
            tracing::warn!("Haar cascades: {e}");
            None
        }
    }
}

#[cfg(not(feature = "opencv"))]
fn load_heuristic(_models: &ModelConfig) -> Option<Box<dyn HeuristicProvider>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_set() {
        let set = ProviderSet::unavailable("no models");
        assert!(!set.accurate_ready());
        assert!(set.heuristic.is_none());
        assert_eq!(
            set.landmarks.err(),
            Some(ModelError::Unavailable("no models".to_string()))
        );
    }

    #[test]
    fn test_cascade_parameters() {
        assert_eq!(CASCADE_SCALE_FACTOR, 1.1);
        assert_eq!(CASCADE_MIN_NEIGHBORS, 4);
        assert_eq!((FACE_MIN_SIZE, EYE_MIN_SIZE), (64, 20));
    }

    #[test]
    fn test_failed_fit_is_inference_error() {
        let faces = vec![BoundingBox::new(0, 0, 80, 80)];
        let result = pair_landmarks(faces, Vec::new(), false);
        assert!(matches!(result, Err(ModelError::Inference(_))));
    }

    #[test]
    fn test_no_faces_is_empty_even_without_fit() {
        assert_eq!(pair_landmarks(Vec::new(), Vec::new(), false), Ok(Vec::new()));
    }

    #[test]
    fn test_fitted_shapes_pair_with_faces() {
        let faces = vec![BoundingBox::new(0, 0, 80, 80), BoundingBox::new(100, 0, 80, 80)];
        let shapes = vec![vec![Point::new(1.0, 2.0); 68], vec![Point::new(3.0, 4.0); 68]];
        let detections = pair_landmarks(faces, shapes, true).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[1].bbox, BoundingBox::new(100, 0, 80, 80));
        assert_eq!(detections[1].landmarks.points()[0], Point::new(3.0, 4.0));
    }

    #[cfg(not(any(feature = "opencv", feature = "onnx")))]
    #[test]
    fn test_from_config_without_backends() {
        let set = ProviderSet::from_config(&ModelConfig::default());
        assert!(!set.accurate_ready());
        assert!(set.heuristic.is_none());
    }
}
