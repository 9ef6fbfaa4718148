//! Camera capture pipeline for the Synheart Stress Agent.
//!
//! This module provides:
//! - The camera device seam ([`CameraBackend`], [`FrameSource`])
//! - The shared state the worker publishes into ([`PipelineState`])
//! - The capture loop ([`CaptureWorker`])
//! - The single-session lifecycle ([`SessionController`])

pub mod camera;
pub mod session;
pub mod state;
pub mod worker;

// Re-export commonly used types
pub use camera::{default_backend, CameraBackend, CaptureError, FrameSource, NoCamera};
pub use session::{SessionController, SessionInfo, SessionStatus, StartOutcome, StartStatus, StopOutcome};
pub use state::{PipelineState, SharedPipelineState};
pub use worker::{CaptureWorker, PipelineContext, SharedEstimator, WorkerState};
