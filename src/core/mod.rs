//! Core functionality for the Synheart Stress Agent.
//!
//! This module contains:
//! - Frame helpers and landmark geometry
//! - Per-feature rolling normalization and exponential smoothing
//! - The throttled emotion gate
//! - Stress estimation producing the published summary

pub mod emotion;
pub mod estimator;
pub mod frame;
pub mod landmarks;
pub mod normalizer;
pub mod smoothing;
pub mod summary;

// Re-export commonly used types
pub use emotion::{Emotion, EmotionGate};
pub use estimator::{
    AccurateEstimator, DetectionCache, EstimatorMode, HeuristicEstimator, ModelStatus,
    SharedModelStatus, StressEstimator,
};
pub use frame::Frame;
pub use landmarks::{BoundingBox, FaceDetection, FaceLandmarks, FaceRegion, Point};
pub use normalizer::{Feature, FeatureHistory, FeatureNormalizer, NormalizedLevel};
pub use smoothing::ExponentialSmoother;
pub use summary::{label_for, StressLabel, Summary};
