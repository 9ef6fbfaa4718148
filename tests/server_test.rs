//! Integration tests for the stress-agent HTTP server

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use synheart_stress_agent::capture::{CameraBackend, CaptureError, FrameSource, SessionController};
use synheart_stress_agent::config::Config;
use synheart_stress_agent::providers::ProviderSet;
use synheart_stress_agent::server::{run, ServerConfig};
use synheart_stress_agent::Frame;

/// Camera producing a plain gray frame on every read.
struct FakeCamera {
    released: Arc<AtomicUsize>,
}

impl FrameSource for FakeCamera {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        Ok(Frame::from_pixel(64, 48, image::Rgb([90, 90, 90])))
    }
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
struct Counters {
    opens: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

struct FakeBackend {
    counters: Counters,
    available: bool,
}

impl CameraBackend for FakeBackend {
    fn open(&self, index: i32) -> Result<Box<dyn FrameSource>, CaptureError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(CaptureError::DeviceUnavailable {
                index,
                reason: "no such device".to_string(),
            });
        }
        Ok(Box::new(FakeCamera {
            released: self.counters.released.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

async fn start_server(
    available: bool,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>, Arc<SessionController>, Counters) {
    let counters = Counters::default();
    let backend = FakeBackend {
        counters: counters.clone(),
        available,
    };
    let mut config = Config::default();
    config.capture.loop_interval = Duration::from_millis(10);

    let sessions = Arc::new(SessionController::with_providers(
        &config,
        ProviderSet::unavailable("no models in tests"),
        Box::new(backend),
    ));

    let mut server_config = ServerConfig::from_config(&config);
    server_config.port = 0;

    let (addr, shutdown_tx) = run(server_config, sessions.clone())
        .await
        .expect("Failed to start server");

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, shutdown_tx, sessions, counters)
}

async fn stop_all(sessions: Arc<SessionController>, shutdown_tx: tokio::sync::oneshot::Sender<()>) {
    let _ = shutdown_tx.send(());
    tokio::task::spawn_blocking(move || sessions.stop())
        .await
        .expect("stop task panicked");
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[tokio::test]
async fn test_liveness_endpoint() {
    let (addr, shutdown_tx, sessions, _) = start_server(true).await;
    let client = reqwest::Client::new();

    for path in ["/", "/api"] {
        let response = client
            .get(format!("http://{}{}", addr, path))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["ok"], true);
    }

    stop_all(sessions, shutdown_tx).await;
}

#[tokio::test]
async fn test_summary_before_start_is_zero() {
    let (addr, shutdown_tx, sessions, _) = start_server(true).await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/api/summary", addr))
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");

    assert_eq!(body["level"], 0.0);
    assert_eq!(body["label"], "Low");
    assert_eq!(body["faces"], 0);

    stop_all(sessions, shutdown_tx).await;
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let (addr, shutdown_tx, sessions, counters) = start_server(true).await;
    let client = reqwest::Client::new();

    let first: serde_json::Value = client
        .post(format!("http://{}/start", addr))
        .json(&serde_json::json!({ "index": 2 }))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(first["status"], "started");
    assert_eq!(first["index"], 2);
    assert_eq!(first["modelsReady"], false);
    assert!(first["modelError"].as_str().is_some());

    // No body: the default device would be used, but a session is running
    let second: serde_json::Value = client
        .post(format!("http://{}/api/start", addr))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(second["status"], "already_running");
    assert_eq!(second["index"], 2);
    assert_eq!(counters.opens.load(Ordering::SeqCst), 1);

    let status: serde_json::Value = client
        .get(format!("http://{}/status", addr))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(status["state"], "running");
    assert_eq!(status["session"]["device_index"], 2);

    stop_all(sessions, shutdown_tx).await;
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent_and_releases_device() {
    let (addr, shutdown_tx, sessions, counters) = start_server(true).await;
    let client = reqwest::Client::new();

    let idle_stop = client
        .post(format!("http://{}/stop", addr))
        .send()
        .await
        .expect("Failed to send request");
    assert!(idle_stop.status().is_success());
    let body: serde_json::Value = idle_stop.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "stopped");

    client
        .post(format!("http://{}/start", addr))
        .send()
        .await
        .expect("Failed to send request");
    let body: serde_json::Value = client
        .post(format!("http://{}/stop", addr))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(body["status"], "stopped");
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    assert!(!sessions.is_active());

    stop_all(sessions, shutdown_tx).await;
}

#[tokio::test]
async fn test_start_with_unavailable_device_is_bad_request() {
    let (addr, shutdown_tx, sessions, _) = start_server(false).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/start", addr))
        .json(&serde_json::json!({ "index": 9 }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "DEVICE_UNAVAILABLE");
    assert!(body["error"].as_str().unwrap_or("").contains("9"));
    assert!(!sessions.is_active());

    stop_all(sessions, shutdown_tx).await;
}

#[tokio::test]
async fn test_summary_stream_emits_first_event() {
    let (addr, shutdown_tx, sessions, _) = start_server(true).await;

    let mut response = reqwest::get(format!("http://{}/stream", addr))
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let mut received = String::new();
    while !received.contains("\n\n") {
        let chunk = tokio::time::timeout(Duration::from_secs(2), response.chunk())
            .await
            .expect("Timed out waiting for event")
            .expect("Failed to read chunk")
            .expect("Stream ended early");
        received.push_str(&String::from_utf8_lossy(&chunk));
    }

    let event = received.split("\n\n").next().unwrap_or("");
    let data = event.strip_prefix("data: ").expect("Missing data field");
    let summary: serde_json::Value = serde_json::from_str(data).expect("Invalid summary JSON");
    assert_eq!(summary["label"], "Low");
    assert_eq!(summary["faces"], 0);

    // An unchanged summary is not sent again
    let next = tokio::time::timeout(Duration::from_millis(600), response.chunk()).await;
    assert!(next.is_err(), "Unexpected repeated event");

    stop_all(sessions, shutdown_tx).await;
}

#[tokio::test]
async fn test_video_stream_parts_are_jpeg() {
    let (addr, shutdown_tx, sessions, _) = start_server(true).await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{}/start", addr))
        .send()
        .await
        .expect("Failed to send request");

    let mut response = client
        .get(format!("http://{}/video", addr))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert_eq!(content_type, "multipart/x-mixed-replace; boundary=frame");

    let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    let mut received: Vec<u8> = Vec::new();
    // Read until a second part starts, so the first one is complete
    while find(&received[header.len().min(received.len())..], header).is_none() {
        let chunk = tokio::time::timeout(Duration::from_secs(3), response.chunk())
            .await
            .expect("Timed out waiting for video")
            .expect("Failed to read chunk")
            .expect("Stream ended early");
        received.extend_from_slice(&chunk);
    }

    assert_eq!(find(&received, header), Some(0));
    let payload = &received[header.len()..];
    let end = find(payload, b"\r\n--frame").expect("Unterminated part");
    let jpeg = &payload[..end];
    assert!(!jpeg.is_empty());
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);

    stop_all(sessions, shutdown_tx).await;
}

#[tokio::test]
async fn test_stats_count_frames() {
    let (addr, shutdown_tx, sessions, _) = start_server(true).await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{}/start", addr))
        .send()
        .await
        .expect("Failed to send request");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats: serde_json::Value = client
        .get(format!("http://{}/stats", addr))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");

    assert!(stats["frames_processed"].as_u64().unwrap_or(0) > 0);
    assert_eq!(stats["sessions_started"], 1);
    assert_eq!(stats["estimator_mode"], "heuristic");

    stop_all(sessions, shutdown_tx).await;
}
