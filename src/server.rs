//! HTTP server exposing the stress summary and the annotated video.
//!
//! This module provides an HTTP server that:
//! - Starts and stops the capture session via POST /start and POST /stop
//! - Serves the latest summary as JSON and as a server-sent event stream
//! - Serves the annotated frames as a multipart JPEG stream
//!
//! # Architecture
//!
//! ```text
//! Camera ──→ capture worker ──→ PipelineState ──┬──→ GET /summary, GET /stream
//!                                               └──→ GET /video
//! ```
//!
//! Stream handlers poll the published state at fixed intervals instead of
//! waiting on notifications. Every route is served both at the root and
//! under `/api`.

use crate::capture::{CaptureError, SessionController, SessionStatus, StartOutcome, StopOutcome};
use crate::config::{Config, StreamConfig};
use crate::core::estimator::EstimatorMode;
use crate::core::frame::Frame;
use crate::core::summary::Summary;
use crate::transparency::StatsSnapshot;
use anyhow::Context;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

/// Multipart boundary of the video stream.
pub const VIDEO_BOUNDARY: &str = "frame";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Camera opened when a start request names none
    pub default_device: i32,
    /// Stream polling and encoding
    pub stream: StreamConfig,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            default_device: 0,
            stream: StreamConfig::default(),
        }
    }

    /// Take the listener, default device and stream settings from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            default_device: config.device_index,
            stream: config.stream.clone(),
        }
    }
}

/// Shared server state
pub struct AppState {
    /// Capture session lifecycle and published pipeline outputs
    sessions: Arc<SessionController>,
    /// Default camera index
    default_device: i32,
    /// Stream settings
    stream: StreamConfig,
    /// Flips to `true` on shutdown so open streams end
    closing: watch::Receiver<bool>,
}

impl AppState {
    fn closing(&self) -> bool {
        *self.closing.borrow()
    }
}

/// Body of POST /start
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRequest {
    pub index: Option<i32>,
}

/// Liveness response
#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Response of GET /stats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    pub estimator_mode: EstimatorMode,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn capture_error(e: CaptureError) -> ApiError {
    let code = match e {
        CaptureError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
        CaptureError::ReadFailed(_) => "READ_FAILED",
    };
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: e.to_string(),
            code: code.to_string(),
        }),
    )
}

fn internal_error(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
            code: "INTERNAL".to_string(),
        }),
    )
}

/// GET /
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

/// POST /start
///
/// A missing or unparsable body starts the default device.
async fn start(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartRequest>>,
) -> Result<Json<StartOutcome>, ApiError> {
    let index = body
        .and_then(|Json(request)| request.index)
        .unwrap_or(state.default_device);

    let sessions = state.sessions.clone();
    let outcome = tokio::task::spawn_blocking(move || sessions.start(index))
        .await
        .map_err(internal_error)?
        .map_err(capture_error)?;
    Ok(Json(outcome))
}

/// POST /stop
async fn stop(State(state): State<Arc<AppState>>) -> Result<Json<StopOutcome>, ApiError> {
    let sessions = state.sessions.clone();
    let outcome = tokio::task::spawn_blocking(move || sessions.stop())
        .await
        .map_err(internal_error)?;
    Ok(Json(outcome))
}

/// GET /summary
async fn summary(State(state): State<Arc<AppState>>) -> Json<Summary> {
    Json(state.sessions.pipeline().state.summary())
}

/// GET /status
async fn status(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    Json(state.sessions.status())
}

/// GET /stats
async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let status = state.sessions.status();
    Json(StatsResponse {
        counters: state.sessions.pipeline().stats.snapshot(),
        estimator_mode: status.estimator_mode,
    })
}

/// GET /stream
async fn summary_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(summary_events(state))
}

/// Emit the summary whenever its serialized form changes.
fn summary_events(state: Arc<AppState>) -> impl Stream<Item = Result<Event, Infallible>> {
    let ticker = tokio::time::interval(state.stream.summary_poll);
    stream::unfold(
        (state, ticker, None::<String>),
        |(state, mut ticker, mut last)| async move {
            loop {
                ticker.tick().await;
                if state.closing() {
                    return None;
                }
                let current = state.sessions.pipeline().state.summary();
                let payload = match serde_json::to_string(&current) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!("Summary serialization failed: {e}");
                        continue;
                    }
                };
                if last.as_deref() == Some(payload.as_str()) {
                    continue;
                }
                last = Some(payload.clone());
                let event = Event::default().data(payload);
                return Some((Ok(event), (state, ticker, last)));
            }
        },
    )
}

/// GET /video
async fn video_stream(State(state): State<Arc<AppState>>) -> Response {
    let content_type = format!("multipart/x-mixed-replace; boundary={VIDEO_BOUNDARY}");
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(video_parts(state)),
    )
        .into_response()
}

/// Encode a frame as JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(frame)?;
    Ok(jpeg)
}

/// Wrap a JPEG payload as one multipart part.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(format!("--{VIDEO_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n").as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Yield the latest frame as a multipart part at the video rate.
///
/// Waits while no frame is published, retries shortly after a failed
/// encode and never yields an empty payload.
fn video_parts(state: Arc<AppState>) -> impl Stream<Item = Result<Bytes, Infallible>> {
    stream::unfold(
        (state, None::<Duration>),
        |(state, mut delay)| async move {
            loop {
                if let Some(wait) = delay.take() {
                    tokio::time::sleep(wait).await;
                }
                if state.closing() {
                    return None;
                }

                let Some(frame) = state.sessions.pipeline().state.frame() else {
                    delay = Some(state.stream.idle_poll);
                    continue;
                };

                let quality = state.stream.jpeg_quality;
                let encoded =
                    tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality)).await;
                match encoded {
                    Ok(Ok(jpeg)) if !jpeg.is_empty() => {
                        let part = multipart_part(&jpeg);
                        let next = Some(state.stream.video_poll);
                        return Some((Ok(part), (state, next)));
                    }
                    Ok(Ok(_)) => tracing::warn!("JPEG encoder produced no data"),
                    Ok(Err(e)) => tracing::warn!("JPEG encode failed: {e}"),
                    Err(e) => tracing::warn!("JPEG encode task failed: {e}"),
                }
                delay = Some(state.stream.encode_retry);
            }
        },
    )
}

fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/summary", get(summary))
        .route("/stream", get(summary_stream))
        .route("/video", get(video_stream))
        .route("/status", get(status))
        .route("/stats", get(stats))
}

/// Build the router: every route at the root and under `/api`.
pub fn router(state: Arc<AppState>) -> Router {
    routes()
        .nest("/api", routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    sessions: Arc<SessionController>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let (closing_tx, closing_rx) = watch::channel(false);
    let state = Arc::new(AppState {
        sessions,
        default_device: config.default_device,
        stream: config.stream.clone(),
        closing: closing_rx,
    });
    let app = router(state);

    let ip: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.host))?;
    let addr = SocketAddr::new(ip, config.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Stress agent server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
                let _ = closing_tx.send(true);
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
