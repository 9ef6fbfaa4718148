//! The capture loop.
//!
//! One dedicated thread owns the opened camera. Each iteration reads a
//! frame, mirrors and downsizes it, runs the estimator, renders the overlay
//! on a copy and publishes both results. The stop signal is only observed
//! between iterations; an in-flight read or estimate always completes.
//! A panic while processing a frame drops that frame and the loop goes on.

use crate::capture::camera::FrameSource;
use crate::capture::state::SharedPipelineState;
use crate::config::CaptureConfig;
use crate::core::estimator::StressEstimator;
use crate::core::frame::{grayscale, limit_width, mirror, Frame};
use crate::overlay::OverlayRenderer;
use crate::transparency::SharedStats;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Estimator shared by every session of the process.
pub type SharedEstimator = Arc<Mutex<StressEstimator>>;

/// Lifecycle of the capture worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Idle => 0,
            WorkerState::Running => 1,
            WorkerState::Stopping => 2,
        }
    }
}

/// Worker state readable without any lock.
#[derive(Debug, Default)]
pub struct WorkerStateCell(AtomicU8);

impl WorkerStateCell {
    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: WorkerState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }
}

/// Resets the state cell to idle when the capture thread ends, however it ends.
struct IdleOnExit(Arc<WorkerStateCell>);

impl Drop for IdleOnExit {
    fn drop(&mut self) {
        self.0.set(WorkerState::Idle);
    }
}

/// Everything the loop needs besides the camera.
#[derive(Clone)]
pub struct PipelineContext {
    pub estimator: SharedEstimator,
    pub renderer: Arc<OverlayRenderer>,
    pub state: SharedPipelineState,
    pub stats: SharedStats,
    pub capture: CaptureConfig,
}

impl PipelineContext {
    /// Run one frame through estimation and rendering, then publish.
    pub fn process_frame(&self, raw: &Frame) {
        let frame = limit_width(mirror(raw), self.capture.max_width);
        let gray = grayscale(&frame);

        let (summary, detections) = {
            let mut estimator = match self.estimator.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let summary = estimator.estimate_gray(&gray);
            (summary, estimator.overlay_detections(&gray))
        };

        let annotated = self.renderer.render(&frame, &detections, &summary);
        self.stats.record_frame(summary.faces);
        self.state.publish(summary, annotated);
    }
}

/// Handle to a running capture thread.
pub struct CaptureWorker {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
    state: Arc<WorkerStateCell>,
}

impl CaptureWorker {
    /// Spawn the loop on an already opened camera.
    pub fn spawn(
        source: Box<dyn FrameSource>,
        context: PipelineContext,
        state: Arc<WorkerStateCell>,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        state.set(WorkerState::Running);

        let thread_state = state.clone();
        let spawned = thread::Builder::new()
            .name("capture-worker".to_string())
            .spawn(move || {
                let _idle = IdleOnExit(thread_state);
                run_loop(source, &context, &stop_rx);
                tracing::debug!("Capture loop exited");
            });

        match spawned {
            Ok(handle) => Ok(Self {
                stop_tx,
                handle: Some(handle),
                state,
            }),
            Err(e) => {
                state.set(WorkerState::Idle);
                Err(e)
            }
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Whether the capture thread has exited without being stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signal the loop and wait for it to exit. The camera is released when
    /// this returns.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.state.set(WorkerState::Stopping);
        let _ = self.stop_tx.try_send(());
        if handle.join().is_err() {
            tracing::error!("Capture worker panicked");
        }
        self.state.set(WorkerState::Idle);
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(mut source: Box<dyn FrameSource>, context: &PipelineContext, stop_rx: &Receiver<()>) {
    let mut consecutive_failures: u64 = 0;

    loop {
        let pause = match source.read_frame() {
            Ok(raw) => {
                if consecutive_failures > 0 {
                    tracing::debug!(consecutive_failures, "Camera reads recovered");
                    consecutive_failures = 0;
                }
                process_guarded(context, &raw);
                context.capture.loop_interval
            }
            Err(e) => {
                consecutive_failures += 1;
                context.stats.record_read_failure();
                tracing::trace!("{e}");
                context.capture.read_retry
            }
        };

        if stop_requested(stop_rx, pause) {
            break;
        }
    }
}

fn process_guarded(context: &PipelineContext, raw: &Frame) {
    if let Err(cause) = panic::catch_unwind(AssertUnwindSafe(|| context.process_frame(raw))) {
        let failures = context.stats.record_processing_failure();
        if failures == 1 || failures % 100 == 0 {
            let message = cause
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| cause.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(failures, "Frame processing panicked, frame dropped: {message}");
        }
    }
}

/// Sleep for `pause` unless a stop arrives first.
fn stop_requested(stop_rx: &Receiver<()>, pause: Duration) -> bool {
    match stop_rx.recv_timeout(pause) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}
