//! Synheart Stress Agent - camera-based stress estimation with live streams.
//!
//! This library reads frames from a local camera, estimates a stress level
//! from facial geometry and expression, and publishes the result together
//! with an annotated preview for any number of HTTP clients.
//!
//! # Privacy Guarantees
//!
//! - **In memory only**: Frames and summaries are never written to disk
//! - **Latest value only**: Only the most recent frame and summary are kept
//! - **Bounded history**: Per-feature baselines hold at most 300 raw values
//! - **Local processing**: Nothing is sent anywhere except to clients of the local server
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Synheart Stress Agent                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Camera    │──▶│  Estimator  │──▶│   Overlay   │       │
//! │  │  (worker)   │   │ (landmarks) │   │  (drawing)  │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         ▲                 │                 │               │
//! │         │                 ▼                 ▼               │
//! │  ┌─────────────┐   ┌───────────────────────────────┐       │
//! │  │   Session   │   │  Pipeline state (summary +    │       │
//! │  │ Controller  │   │  frame, separately locked)    │       │
//! │  └─────────────┘   └───────────────────────────────┘       │
//! │         ▲                         │                         │
//! │         └──── HTTP server ◀───────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use synheart_stress_agent::{capture, config::Config, server};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let sessions = Arc::new(capture::SessionController::from_config(
//!     &config,
//!     capture::default_backend(),
//! ));
//!
//! let (addr, shutdown) = server::run(server::ServerConfig::from_config(&config), sessions).await?;
//! println!("listening on {addr}");
//! let _ = shutdown.send(());
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod core;
pub mod overlay;
pub mod providers;
pub mod server;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use capture::{CaptureError, SessionController, StartOutcome, StartStatus};
pub use config::Config;
pub use core::{EstimatorMode, Frame, StressEstimator, StressLabel, Summary};
pub use overlay::OverlayRenderer;
pub use providers::{EmotionClassifier, HeuristicProvider, LandmarkProvider, ModelError, ProviderSet};
pub use transparency::{PipelineStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║           SYNHEART STRESS AGENT - PRIVACY DECLARATION            ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent estimates a stress level from your camera image.     ║
║                                                                  ║
║  ✓ WHAT WE PROCESS:                                              ║
║    • Camera frames, only while a session is running              ║
║    • Facial landmark distances (eyebrows, eyes, mouth, chin)     ║
║    • A coarse expression label from a local classifier           ║
║                                                                  ║
║  ✗ WHAT WE NEVER DO:                                             ║
║    • Write frames, summaries or landmarks to disk                ║
║    • Identify who is in front of the camera                      ║
║    • Send anything to a remote service                           ║
║    • Keep more than the latest frame in memory                   ║
║                                                                  ║
║  The camera is released as soon as the session is stopped.       ║
║  Statistics are counters only and vanish when the agent exits.   ║
║                                                                  ║
║  You can view the current state anytime with:                    ║
║    synheart-stress status                                        ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
