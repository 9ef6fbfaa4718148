//! Camera device abstraction.

use crate::core::frame::Frame;

/// Errors from the capture device.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// The device could not be opened
    DeviceUnavailable { index: i32, reason: String },
    /// A single frame read failed; the loop retries
    ReadFailed(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::DeviceUnavailable { index, reason } => {
                write!(f, "Cannot open camera index {index}: {reason}")
            }
            CaptureError::ReadFailed(e) => write!(f, "Frame read failed: {e}"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// An opened camera delivering RGB frames.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Opens camera devices by index.
pub trait CameraBackend: Send + Sync {
    fn open(&self, index: i32) -> Result<Box<dyn FrameSource>, CaptureError>;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// Backend for builds without a camera library. Every open fails.
#[derive(Debug, Default)]
pub struct NoCamera;

impl CameraBackend for NoCamera {
    fn open(&self, index: i32) -> Result<Box<dyn FrameSource>, CaptureError> {
        Err(CaptureError::DeviceUnavailable {
            index,
            reason: "no camera backend compiled in (enable the `opencv` feature)".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Create the camera backend for the current build.
pub fn default_backend() -> Box<dyn CameraBackend> {
    #[cfg(feature = "opencv")]
    {
        Box::new(crate::providers::cv::OpenCvCameraBackend)
    }

    #[cfg(not(feature = "opencv"))]
    {
        Box::new(NoCamera)
    }
}
