//! In-memory pipeline counters.
//!
//! Counts what the pipeline did without storing any image or per-frame
//! value. Nothing here is ever written to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters shared by the capture worker, the session controller and the
/// server.
#[derive(Debug)]
pub struct PipelineStats {
    /// Frames run through the estimator
    frames_processed: AtomicU64,
    /// Failed device reads
    read_failures: AtomicU64,
    /// Frames in which at least one face was found
    frames_with_faces: AtomicU64,
    /// Overlay renders that failed and were skipped
    overlay_failures: AtomicU64,
    /// Frames dropped because estimation panicked
    processing_failures: AtomicU64,
    /// Sessions started since process start
    sessions_started: AtomicU64,
    /// Process start time
    started_at: DateTime<Utc>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            frames_processed: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            frames_with_faces: AtomicU64::new(0),
            overlay_failures: AtomicU64::new(0),
            processing_failures: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    /// Record a processed frame and whether it contained a face.
    pub fn record_frame(&self, faces: u32) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        if faces > 0 {
            self.frames_with_faces.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overlay_failure(&self) {
        self.overlay_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new total.
    pub fn record_processing_failure(&self) -> u64 {
        self.processing_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            frames_with_faces: self.frames_with_faces.load(Ordering::Relaxed),
            overlay_failures: self.overlay_failures.load(Ordering::Relaxed),
            processing_failures: self.processing_failures.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Pipeline Statistics:\n\
             - Frames processed: {}\n\
             - Frames with faces: {}\n\
             - Read failures: {}\n\
             - Overlay failures: {}\n\
             - Processing failures: {}\n\
             - Sessions started: {}\n\
             - Uptime: {} seconds",
            stats.frames_processed,
            stats.frames_with_faces,
            stats.read_failures,
            stats.overlay_failures,
            stats.processing_failures,
            stats.sessions_started,
            stats.uptime_secs
        )
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_processed: u64,
    pub read_failures: u64,
    pub frames_with_faces: u64,
    pub overlay_failures: u64,
    pub processing_failures: u64,
    pub sessions_started: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Thread-safe shared counters.
pub type SharedStats = Arc<PipelineStats>;

/// Create a new shared counter set.
pub fn create_shared_stats() -> SharedStats {
    Arc::new(PipelineStats::new())
}
