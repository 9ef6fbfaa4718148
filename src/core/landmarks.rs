//! Facial landmark geometry and the raw per-feature stress metrics.
//!
//! Landmarks follow the 68-point layout: jaw, eyebrows, nose, eyes and
//! mouth occupy fixed index ranges. Every metric has a safe default so a
//! single unmeasurable feature never aborts an estimate.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Number of points in a full landmark set.
pub const LANDMARK_COUNT: usize = 68;

/// EAR used when an eye cannot be measured.
pub const DEFAULT_EYE_ASPECT_RATIO: f64 = 0.3;

/// MAR used when the mouth cannot be measured.
pub const DEFAULT_MOUTH_ASPECT_RATIO: f64 = 0.4;

/// Chin ratio used when the nose tip or chin point is missing.
pub const DEFAULT_CHIN_RATIO: f64 = 0.3;

const NOSE_TIP: usize = 33;
const CHIN: usize = 8;
const MIN_EXTENT: f64 = 1e-6;

/// A 2D point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Intersect with a `frame_width` x `frame_height` frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        let x0 = self.x.max(0) as i64;
        let y0 = self.y.max(0) as i64;
        let x1 = (self.x as i64 + self.width as i64).min(frame_width as i64);
        let y1 = (self.y as i64 + self.height as i64).min(frame_height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(BoundingBox::new(
            x0 as i32,
            y0 as i32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        ))
    }
}

/// Named landmark regions of the 68-point layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceRegion {
    Jaw,
    RightEyebrow,
    LeftEyebrow,
    Nose,
    RightEye,
    LeftEye,
    Mouth,
}

impl FaceRegion {
    pub fn range(&self) -> Range<usize> {
        match self {
            FaceRegion::Jaw => 0..17,
            FaceRegion::RightEyebrow => 17..22,
            FaceRegion::LeftEyebrow => 22..27,
            FaceRegion::Nose => 27..36,
            FaceRegion::RightEye => 36..42,
            FaceRegion::LeftEye => 42..48,
            FaceRegion::Mouth => 48..68,
        }
    }
}

/// Ordered landmark points for one face.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceLandmarks {
    points: Vec<Point>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn point(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }

    /// Whether every region of the layout is present.
    pub fn is_complete(&self) -> bool {
        self.points.len() >= LANDMARK_COUNT
    }

    /// Points of `region`, or an empty slice if the set is too short.
    pub fn region(&self, region: FaceRegion) -> &[Point] {
        self.points.get(region.range()).unwrap_or(&[])
    }
}

/// One face reported by the landmark provider.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub landmarks: FaceLandmarks,
}

/// Raw facial metrics for one face, each clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMetrics {
    pub eyebrow: f64,
    pub eyes: f64,
    pub mouth: f64,
    pub chin: f64,
}

impl FaceMetrics {
    /// Measure a face. Returns `None` when the eyebrows are missing, since
    /// no estimate is attempted without them.
    pub fn measure(detection: &FaceDetection) -> Option<Self> {
        let landmarks = &detection.landmarks;
        let face_width = (detection.bbox.width as f64).max(1.0);
        let face_height = (detection.bbox.height as f64).max(1.0);

        let eyebrow = eyebrow_metric(landmarks, face_width)?;
        let ear_left = eye_aspect_ratio(landmarks.region(FaceRegion::LeftEye));
        let ear_right = eye_aspect_ratio(landmarks.region(FaceRegion::RightEye));
        let eyes = (1.0 - ear_left.min(ear_right)).clamp(0.0, 1.0);
        let mouth = mouth_aspect_ratio(landmarks.region(FaceRegion::Mouth)).clamp(0.0, 1.0);
        let chin = chin_ratio(landmarks, face_height).clamp(0.0, 1.0);

        Some(Self {
            eyebrow,
            eyes,
            mouth,
            chin,
        })
    }
}

/// `1 - (inner eyebrow tip distance / face width)`, clamped.
fn eyebrow_metric(landmarks: &FaceLandmarks, face_width: f64) -> Option<f64> {
    let right_inner = landmarks.region(FaceRegion::RightEyebrow).last()?;
    let left_inner = landmarks.region(FaceRegion::LeftEyebrow).first()?;
    let ratio = right_inner.distance(left_inner) / face_width;
    Some((1.0 - ratio).clamp(0.0, 1.0))
}

/// Eye aspect ratio from six ordered eye points.
pub fn eye_aspect_ratio(eye: &[Point]) -> f64 {
    if eye.len() != 6 {
        tracing::trace!(points = eye.len(), "eye not measurable, using default EAR");
        return DEFAULT_EYE_ASPECT_RATIO;
    }
    let vertical_a = eye[1].distance(&eye[5]);
    let vertical_b = eye[2].distance(&eye[4]);
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal <= MIN_EXTENT {
        return DEFAULT_EYE_ASPECT_RATIO;
    }
    (vertical_a + vertical_b) / (2.0 * horizontal)
}

/// Mouth aspect ratio: mean of three vertical lip distances over width.
pub fn mouth_aspect_ratio(mouth: &[Point]) -> f64 {
    if mouth.len() < 11 {
        tracing::trace!(points = mouth.len(), "mouth not measurable, using default MAR");
        return DEFAULT_MOUTH_ASPECT_RATIO;
    }
    let horizontal = mouth[0].distance(&mouth[6]);
    if horizontal <= MIN_EXTENT {
        return DEFAULT_MOUTH_ASPECT_RATIO;
    }
    let vertical = (mouth[2].distance(&mouth[10])
        + mouth[4].distance(&mouth[8])
        + mouth[3].distance(&mouth[9]))
        / 3.0;
    vertical / horizontal
}

/// Nose-tip to chin distance over face height.
fn chin_ratio(landmarks: &FaceLandmarks, face_height: f64) -> f64 {
    match (landmarks.point(NOSE_TIP), landmarks.point(CHIN)) {
        (Some(nose), Some(chin)) => nose.distance(&chin) / face_height,
        _ => DEFAULT_CHIN_RATIO,
    }
}
