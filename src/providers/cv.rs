//! OpenCV backends: camera capture, Haar cascades and LBF facemark.

use super::{
    pair_landmarks, HeuristicFace, HeuristicProvider, LandmarkProvider, ModelError,
    CASCADE_MIN_NEIGHBORS, CASCADE_SCALE_FACTOR, EYE_MIN_SIZE, FACE_MIN_SIZE,
};
use crate::capture::camera::{CameraBackend, CaptureError, FrameSource};
use crate::core::frame::Frame;
use crate::core::landmarks::{BoundingBox, FaceDetection, Point};
use image::{GrayImage, RgbImage};
use opencv::{
    core::{Mat, Point2f, Ptr, Rect, Size, Vector},
    face::{self, Facemark},
    imgproc,
    objdetect::CascadeClassifier,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::Path;

fn unavailable(context: &str, e: opencv::Error) -> ModelError {
    ModelError::Unavailable(format!("{context}: {e}"))
}

fn inference(context: &str, e: opencv::Error) -> ModelError {
    ModelError::Inference(format!("{context}: {e}"))
}

fn path_str(path: &Path) -> Result<&str, ModelError> {
    path.to_str()
        .ok_or_else(|| ModelError::Unavailable(format!("non UTF-8 path {}", path.display())))
}

fn load_cascade(path: &Path) -> Result<CascadeClassifier, ModelError> {
    if !path.exists() {
        return Err(ModelError::Unavailable(format!(
            "cascade not found at {}",
            path.display()
        )));
    }
    let cascade =
        CascadeClassifier::new(path_str(path)?).map_err(|e| unavailable("load cascade", e))?;
    if cascade.empty().map_err(|e| unavailable("load cascade", e))? {
        return Err(ModelError::Unavailable(format!(
            "cascade at {} is empty",
            path.display()
        )));
    }
    Ok(cascade)
}

/// Borrow a grayscale image as an owned single-channel Mat.
fn gray_to_mat(gray: &GrayImage) -> opencv::Result<Mat> {
    let (width, height) = gray.dimensions();
    let view = Mat::new_rows_cols_with_data(height as i32, width as i32, gray.as_raw())?;
    view.try_clone()
}

fn detect_faces(
    cascade: &mut CascadeClassifier,
    gray: &Mat,
    min_size: i32,
    min_neighbors: i32,
) -> opencv::Result<Vector<Rect>> {
    let mut found = Vector::<Rect>::new();
    cascade.detect_multi_scale(
        gray,
        &mut found,
        CASCADE_SCALE_FACTOR,
        min_neighbors,
        0,
        Size::new(min_size, min_size),
        Size::new(0, 0),
    )?;
    Ok(found)
}

fn to_bbox(rect: &Rect) -> BoundingBox {
    BoundingBox::new(
        rect.x,
        rect.y,
        rect.width.max(0) as u32,
        rect.height.max(0) as u32,
    )
}

/// Haar face detector feeding the LBF 68-point facemark model.
pub struct FacemarkProvider {
    cascade: CascadeClassifier,
    facemark: Ptr<Facemark>,
}

impl FacemarkProvider {
    pub fn load(face_cascade: &Path, model: &Path) -> Result<Self, ModelError> {
        let cascade = load_cascade(face_cascade)?;
        if !model.exists() {
            return Err(ModelError::Unavailable(format!(
                "landmark model not found at {}",
                model.display()
            )));
        }
        let mut facemark =
            face::create_facemark_lbf().map_err(|e| unavailable("create facemark", e))?;
        facemark
            .load_model(path_str(model)?)
            .map_err(|e| unavailable("load landmark model", e))?;

        tracing::info!(model = %model.display(), "Landmark model loaded");
        Ok(Self { cascade, facemark })
    }
}

impl LandmarkProvider for FacemarkProvider {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceDetection>, ModelError> {
        let mat = gray_to_mat(gray).map_err(|e| inference("frame conversion", e))?;
        let faces = detect_faces(&mut self.cascade, &mat, FACE_MIN_SIZE, CASCADE_MIN_NEIGHBORS)
            .map_err(|e| inference("face detection", e))?;
        if faces.is_empty() {
            return Ok(Vec::new());
        }

        let mut shapes = Vector::<Vector<Point2f>>::new();
        let fitted = self
            .facemark
            .fit(&mat, &faces, &mut shapes)
            .map_err(|e| inference("landmark fit", e))?;

        let boxes = faces.iter().map(|rect| to_bbox(&rect)).collect();
        let points = shapes
            .iter()
            .map(|shape| {
                shape
                    .iter()
                    .map(|p| Point::new(p.x as f64, p.y as f64))
                    .collect()
            })
            .collect();
        pair_landmarks(boxes, points, fitted)
    }
}

/// Haar face and eye cascades for the edge-density estimator.
pub struct HaarProvider {
    face: CascadeClassifier,
    eye: CascadeClassifier,
}

impl HaarProvider {
    pub fn load(face_cascade: &Path, eye_cascade: &Path) -> Result<Self, ModelError> {
        Ok(Self {
            face: load_cascade(face_cascade)?,
            eye: load_cascade(eye_cascade)?,
        })
    }
}

impl HeuristicProvider for HaarProvider {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<HeuristicFace>, ModelError> {
        let mat = gray_to_mat(gray).map_err(|e| inference("frame conversion", e))?;
        let faces = detect_faces(&mut self.face, &mat, FACE_MIN_SIZE, CASCADE_MIN_NEIGHBORS)
            .map_err(|e| inference("face detection", e))?;

        let mut result = Vec::with_capacity(faces.len());
        for rect in faces.iter() {
            let roi = Mat::roi(&mat, rect).map_err(|e| inference("face roi", e))?;
            let eyes = detect_faces(&mut self.eye, &*roi, EYE_MIN_SIZE, CASCADE_MIN_NEIGHBORS)
                .map_err(|e| inference("eye detection", e))?;
            result.push(HeuristicFace {
                face: to_bbox(&rect),
                eyes: eyes.iter().map(|e| to_bbox(&e)).collect(),
            });
        }
        Ok(result)
    }
}

/// Opens local cameras through `VideoCapture`.
#[derive(Debug, Default)]
pub struct OpenCvCameraBackend;

impl CameraBackend for OpenCvCameraBackend {
    fn open(&self, index: i32) -> Result<Box<dyn FrameSource>, CaptureError> {
        let device_error = |reason: String| CaptureError::DeviceUnavailable { index, reason };

        let capture = VideoCapture::new(index, videoio::CAP_ANY)
            .map_err(|e| device_error(e.to_string()))?;
        if !capture.is_opened().map_err(|e| device_error(e.to_string()))? {
            return Err(device_error("device did not open".to_string()));
        }
        Ok(Box::new(OpenCvCamera { capture }))
    }

    fn name(&self) -> &'static str {
        "opencv"
    }
}

/// An opened OpenCV camera. The device is released on drop.
pub struct OpenCvCamera {
    capture: VideoCapture,
}

impl FrameSource for OpenCvCamera {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let read_error = |e: opencv::Error| CaptureError::ReadFailed(e.to_string());

        let mut bgr = Mat::default();
        let ok = self.capture.read(&mut bgr).map_err(read_error)?;
        if !ok || bgr.empty() {
            return Err(CaptureError::ReadFailed("empty frame".to_string()));
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB).map_err(read_error)?;
        let rgb = if rgb.is_continuous() {
            rgb
        } else {
            rgb.try_clone().map_err(read_error)?
        };

        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        let data = rgb.data_bytes().map_err(read_error)?.to_vec();
        RgbImage::from_raw(width, height, data)
            .ok_or_else(|| CaptureError::ReadFailed("frame buffer size mismatch".to_string()))
    }
}
