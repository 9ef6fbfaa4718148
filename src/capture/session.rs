//! Single-session lifecycle.
//!
//! At most one capture worker runs per process. Start and stop are
//! serialized by one lock; a start while a session is active reports the
//! running session and touches no device.

use crate::capture::camera::{CameraBackend, CaptureError};
use crate::capture::state::{PipelineState, SharedPipelineState};
use crate::capture::worker::{
    CaptureWorker, PipelineContext, SharedEstimator, WorkerState, WorkerStateCell,
};
use crate::config::{CaptureConfig, Config};
use crate::core::estimator::{EstimatorMode, ModelStatus, SharedModelStatus, StressEstimator};
use crate::overlay::OverlayRenderer;
use crate::providers::ProviderSet;
use crate::transparency::{create_shared_stats, SharedStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use uuid::Uuid;

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    Started,
    AlreadyRunning,
}

/// Response body of a start request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub status: StartStatus,
    pub index: i32,
    pub models_ready: bool,
    pub model_error: Option<String>,
}

/// Response body of a stop request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopOutcome {
    pub status: String,
}

impl StopOutcome {
    fn stopped() -> Self {
        Self {
            status: "stopped".to_string(),
        }
    }
}

/// Identity of the running session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub device_index: i32,
    pub started_at: DateTime<Utc>,
}

/// Snapshot reported by `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: WorkerState,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
    pub camera_backend: String,
    pub estimator_mode: EstimatorMode,
    pub models_ready: bool,
    pub model_error: Option<String>,
}

struct ActiveSession {
    info: SessionInfo,
    worker: CaptureWorker,
}

/// Starts and stops the capture worker.
pub struct SessionController {
    backend: Box<dyn CameraBackend>,
    context: PipelineContext,
    session: Mutex<Option<ActiveSession>>,
    info: RwLock<Option<SessionInfo>>,
    worker_state: Arc<WorkerStateCell>,
    model_status: SharedModelStatus,
}

impl SessionController {
    pub fn new(
        backend: Box<dyn CameraBackend>,
        estimator: SharedEstimator,
        renderer: Arc<OverlayRenderer>,
        state: SharedPipelineState,
        stats: SharedStats,
        capture: CaptureConfig,
    ) -> Self {
        let model_status = match estimator.lock() {
            Ok(guard) => guard.status_handle(),
            Err(poisoned) => poisoned.into_inner().status_handle(),
        };
        Self {
            backend,
            context: PipelineContext {
                estimator,
                renderer,
                state,
                stats,
                capture,
            },
            session: Mutex::new(None),
            info: RwLock::new(None),
            worker_state: Arc::new(WorkerStateCell::default()),
            model_status,
        }
    }

    /// Build the whole pipeline from configuration: providers, estimator,
    /// overlay renderer, shared state and counters.
    pub fn from_config(config: &Config, backend: Box<dyn CameraBackend>) -> Self {
        let providers = ProviderSet::from_config(&config.models);
        Self::with_providers(config, providers, backend)
    }

    /// Like [`SessionController::from_config`] with explicit providers.
    pub fn with_providers(
        config: &Config,
        providers: ProviderSet,
        backend: Box<dyn CameraBackend>,
    ) -> Self {
        let stats = create_shared_stats();
        let estimator = StressEstimator::new(providers, &config.estimator);
        let renderer =
            OverlayRenderer::from_font_path(config.models.overlay_font.as_deref()).with_stats(stats.clone());
        Self::new(
            backend,
            Arc::new(Mutex::new(estimator)),
            Arc::new(renderer),
            Arc::new(PipelineState::new()),
            stats,
            config.capture.clone(),
        )
    }

    /// Open `device_index` and launch the worker, unless a session is active.
    ///
    /// Blocks while the device opens; call from a blocking context.
    pub fn start(&self, device_index: i32) -> Result<StartOutcome, CaptureError> {
        let mut session = self.lock_session();

        if session.as_ref().is_some_and(|active| active.worker.is_finished()) {
            if let Some(mut dead) = session.take() {
                tracing::warn!(
                    session_id = %dead.info.session_id,
                    "Capture worker exited unexpectedly, starting a new session"
                );
                dead.worker.stop();
                self.set_info(None);
            }
        }

        if let Some(active) = session.as_ref() {
            tracing::debug!(
                session_id = %active.info.session_id,
                "Start requested while a session is running"
            );
            return Ok(self.outcome(StartStatus::AlreadyRunning, active.info.device_index));
        }

        let source = self.backend.open(device_index).map_err(|e| {
            tracing::warn!(device_index, "{e}");
            e
        })?;

        let worker = CaptureWorker::spawn(source, self.context.clone(), self.worker_state.clone())
            .map_err(|e| CaptureError::DeviceUnavailable {
                index: device_index,
                reason: format!("failed to spawn capture thread: {e}"),
            })?;

        let info = SessionInfo {
            session_id: Uuid::new_v4(),
            device_index,
            started_at: Utc::now(),
        };
        tracing::info!(
            session_id = %info.session_id,
            device_index,
            backend = self.backend.name(),
            "Capture session started"
        );

        self.set_info(Some(info.clone()));
        *session = Some(ActiveSession { info, worker });
        self.context.stats.record_session_started();

        Ok(self.outcome(StartStatus::Started, device_index))
    }

    /// Stop the worker and release the device. Succeeds when idle.
    ///
    /// Blocks for at most one loop iteration.
    pub fn stop(&self) -> StopOutcome {
        let mut session = self.lock_session();

        if let Some(mut active) = session.take() {
            active.worker.stop();
            self.set_info(None);
            tracing::info!(session_id = %active.info.session_id, "Capture session stopped");
        }

        StopOutcome::stopped()
    }

    /// Whether a session is running. A worker that died is not active.
    pub fn is_active(&self) -> bool {
        self.read_info().is_some() && self.worker_state.get() != WorkerState::Idle
    }

    /// Current state. Never waits on a start or stop in progress, nor on
    /// the estimator.
    pub fn status(&self) -> SessionStatus {
        let state = self.worker_state.get();
        let session = self.read_info().filter(|_| state != WorkerState::Idle);
        let models = self.model_status();
        SessionStatus {
            state,
            active: session.is_some(),
            session,
            camera_backend: self.backend.name().to_string(),
            estimator_mode: models.mode,
            models_ready: models.models_ready,
            model_error: models.model_error,
        }
    }

    pub fn pipeline(&self) -> &PipelineContext {
        &self.context
    }

    fn outcome(&self, status: StartStatus, index: i32) -> StartOutcome {
        let models = self.model_status();
        StartOutcome {
            status,
            index,
            models_ready: models.models_ready,
            model_error: models.model_error,
        }
    }

    fn model_status(&self) -> ModelStatus {
        match self.model_status.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_info(&self) -> Option<SessionInfo> {
        match self.info.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_info(&self, info: Option<SessionInfo>) {
        match self.info.write() {
            Ok(mut guard) => *guard = info,
            Err(poisoned) => *poisoned.into_inner() = info,
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}
