//! Diagnostic overlay drawn on published frames.
//!
//! Draws the cached face geometry and the current stress label onto a copy
//! of the frame. Rendering never fails from the caller's point of view: on
//! any error the unannotated copy is returned and the failure is counted.

use crate::core::estimator::DetectionCache;
use crate::core::frame::Frame;
use crate::core::landmarks::{BoundingBox, FaceLandmarks, FaceRegion, Point};
use crate::core::summary::Summary;
use crate::transparency::SharedStats;
use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::Rgb;
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::geometry::convex_hull;
use imageproc::rect::Rect;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Left end of the label baseline.
const TEXT_ORIGIN: (i32, i32) = (10, 20);
const TEXT_SCALE: f32 = 18.0;

/// Font used for the label unless one is configured.
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSansMono.ttf");

const GAUGE_ORIGIN: (i32, i32) = (10, 10);
const GAUGE_WIDTH: u32 = 100;
const GAUGE_HEIGHT: u32 = 8;

/// Reasons an overlay could not be drawn.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayError {
    /// The frame has no pixels
    EmptyFrame,
    /// Cached geometry holds non-finite coordinates
    InvalidGeometry(String),
    /// The font file could not be read or parsed
    Font(String),
    /// The drawing code panicked
    Drawing(String),
}

impl std::fmt::Display for OverlayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlayError::EmptyFrame => write!(f, "Frame is empty"),
            OverlayError::InvalidGeometry(e) => write!(f, "Invalid geometry: {e}"),
            OverlayError::Font(e) => write!(f, "Font error: {e}"),
            OverlayError::Drawing(e) => write!(f, "Drawing failed: {e}"),
        }
    }
}

impl std::error::Error for OverlayError {}

/// Draws detection geometry and the stress label onto frames.
pub struct OverlayRenderer {
    font: Option<FontArc>,
    stats: Option<SharedStats>,
}

impl OverlayRenderer {
    /// Renderer drawing the label with the bundled font.
    pub fn new() -> Self {
        let font = FontArc::try_from_slice(BUNDLED_FONT)
            .map_err(|e| tracing::warn!("Bundled overlay font unusable, drawing a gauge instead: {e}"))
            .ok();
        Self { font, stats: None }
    }

    /// Renderer without a font. The label is shown as a gauge bar.
    pub fn without_font() -> Self {
        Self {
            font: None,
            stats: None,
        }
    }

    /// Renderer drawing the label text with the TrueType font at `path`.
    pub fn with_font_file(path: &Path) -> Result<Self, OverlayError> {
        let bytes = std::fs::read(path)
            .map_err(|e| OverlayError::Font(format!("{}: {e}", path.display())))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| OverlayError::Font(format!("{}: {e}", path.display())))?;
        Ok(Self {
            font: Some(font),
            stats: None,
        })
    }

    /// Load the configured font, falling back to the bundled one.
    pub fn from_font_path(path: Option<&Path>) -> Self {
        match path.map(Self::with_font_file) {
            Some(Ok(renderer)) => renderer,
            Some(Err(e)) => {
                tracing::warn!("Overlay font unavailable, using the bundled font: {e}");
                Self::new()
            }
            None => Self::new(),
        }
    }

    /// Count failures in the shared pipeline stats.
    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Return an annotated copy of `frame`.
    ///
    /// On failure the copy is returned without annotations.
    pub fn render(&self, frame: &Frame, detections: &DetectionCache, summary: &Summary) -> Frame {
        let mut annotated = frame.clone();
        match self.try_render(&mut annotated, detections, summary) {
            Ok(()) => annotated,
            Err(e) => {
                tracing::debug!("Overlay skipped: {e}");
                if let Some(stats) = &self.stats {
                    stats.record_overlay_failure();
                }
                frame.clone()
            }
        }
    }

    /// Draw onto `frame` in place.
    pub fn try_render(
        &self,
        frame: &mut Frame,
        detections: &DetectionCache,
        summary: &Summary,
    ) -> Result<(), OverlayError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(OverlayError::EmptyFrame);
        }
        if let Some(landmarks) = &detections.landmarks {
            validate(landmarks.points())?;
        }

        panic::catch_unwind(AssertUnwindSafe(|| {
            if let Some(face) = &detections.face {
                draw_face_box(frame, face);
            }
            if let Some(landmarks) = detections.landmarks.as_ref().filter(|l| l.is_complete()) {
                draw_landmarks(frame, landmarks);
            }
            match &self.font {
                Some(font) => draw_label(frame, font, summary),
                None => draw_gauge(frame, summary),
            }
        }))
        .map_err(|cause| {
            let message = cause
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| cause.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            OverlayError::Drawing(message)
        })
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(points: &[Point]) -> Result<(), OverlayError> {
    match points.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
        Some(index) => Err(OverlayError::InvalidGeometry(format!(
            "landmark {index} is not finite"
        ))),
        None => Ok(()),
    }
}

fn draw_face_box(frame: &mut Frame, face: &BoundingBox) {
    if face.width == 0 || face.height == 0 {
        return;
    }
    let rect = Rect::at(face.x, face.y).of_size(face.width, face.height);
    draw_hollow_rect_mut(frame, rect, OVERLAY_COLOR);
}

fn draw_landmarks(frame: &mut Frame, landmarks: &FaceLandmarks) {
    for brow in [FaceRegion::RightEyebrow, FaceRegion::LeftEyebrow] {
        draw_hull(frame, landmarks.region(brow));
    }
    for closed in [FaceRegion::RightEye, FaceRegion::LeftEye, FaceRegion::Mouth] {
        draw_polyline(frame, landmarks.region(closed), true);
    }
    draw_polyline(frame, landmarks.region(FaceRegion::Jaw), false);
}

fn draw_hull(frame: &mut Frame, points: &[Point]) {
    let pixels: Vec<imageproc::point::Point<i32>> = points
        .iter()
        .map(|p| imageproc::point::Point::new(p.x.round() as i32, p.y.round() as i32))
        .collect();
    if pixels.len() < 3 {
        return;
    }
    let hull: Vec<Point> = convex_hull(pixels)
        .into_iter()
        .map(|p| Point::new(p.x as f64, p.y as f64))
        .collect();
    draw_polyline(frame, &hull, true);
}

fn draw_polyline(frame: &mut Frame, points: &[Point], closed: bool) {
    for pair in points.windows(2) {
        segment(frame, &pair[0], &pair[1]);
    }
    if closed && points.len() > 2 {
        if let (Some(last), Some(first)) = (points.last(), points.first()) {
            segment(frame, last, first);
        }
    }
}

fn segment(frame: &mut Frame, a: &Point, b: &Point) {
    draw_line_segment_mut(
        frame,
        (a.x as f32, a.y as f32),
        (b.x as f32, b.y as f32),
        OVERLAY_COLOR,
    );
}

/// Text shown for a summary, e.g. `"Moderate 42%"`.
pub fn label_text(summary: &Summary) -> String {
    format!("{} {}%", summary.label, summary.percent())
}

fn draw_label(frame: &mut Frame, font: &FontArc, summary: &Summary) {
    let scale = PxScale::from(TEXT_SCALE);
    let ascent = font.as_scaled(scale).ascent().round() as i32;
    let (x, baseline) = TEXT_ORIGIN;
    draw_text_mut(
        frame,
        OVERLAY_COLOR,
        x,
        (baseline - ascent).max(0),
        scale,
        font,
        &label_text(summary),
    );
}

fn draw_gauge(frame: &mut Frame, summary: &Summary) {
    let (x, y) = GAUGE_ORIGIN;
    draw_hollow_rect_mut(
        frame,
        Rect::at(x, y).of_size(GAUGE_WIDTH, GAUGE_HEIGHT),
        OVERLAY_COLOR,
    );
    let filled = GAUGE_WIDTH * summary.percent() / 100;
    if filled > 0 {
        draw_filled_rect_mut(
            frame,
            Rect::at(x, y).of_size(filled, GAUGE_HEIGHT),
            OVERLAY_COLOR,
        );
    }
}
