//! Published pipeline outputs.
//!
//! The latest summary and the latest annotated frame are guarded by two
//! separate locks, so video readers copying a frame never hold up summary
//! readers or the worker publishing a summary. Every operation is a whole
//! value get or replace; locks are never held across I/O or encoding.

use crate::core::frame::Frame;
use crate::core::summary::Summary;
use std::sync::{Arc, Mutex, RwLock};

/// Latest summary and annotated frame produced by the capture worker.
#[derive(Debug, Default)]
pub struct PipelineState {
    summary: RwLock<Summary>,
    frame: Mutex<Option<Arc<Frame>>>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the latest summary. The zero summary until a frame is processed.
    pub fn summary(&self) -> Summary {
        match self.summary.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn replace_summary(&self, summary: Summary) {
        match self.summary.write() {
            Ok(mut guard) => *guard = summary,
            Err(poisoned) => *poisoned.into_inner() = summary,
        }
    }

    /// Latest annotated frame, if any was published.
    ///
    /// Frames are published behind an `Arc`, so the lock is only held for a
    /// reference count bump.
    pub fn frame(&self) -> Option<Arc<Frame>> {
        match self.frame.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace_frame(&self, frame: Frame) {
        let frame = Arc::new(frame);
        match self.frame.lock() {
            Ok(mut guard) => *guard = Some(frame),
            Err(poisoned) => *poisoned.into_inner() = Some(frame),
        }
    }

    /// Publish the results of one iteration.
    pub fn publish(&self, summary: Summary, frame: Frame) {
        self.replace_summary(summary);
        self.replace_frame(frame);
    }
}

/// Thread-safe shared pipeline state.
pub type SharedPipelineState = Arc<PipelineState>;
