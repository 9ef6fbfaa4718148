//! Configuration for the Synheart Stress Agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the stress agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera device opened when a start request names none
    pub device_index: i32,

    /// HTTP listener
    pub server: ServerSection,

    /// Model and asset locations
    pub models: ModelConfig,

    /// Stress estimation constants
    pub estimator: EstimatorConfig,

    /// Capture loop pacing
    pub capture: CaptureConfig,

    /// Stream polling and encoding
    pub stream: StreamConfig,
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-stress-agent")
            .join("config.json")
    }

    /// Apply the `PORT` environment variable, if set and valid.
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Paths to model files and overlay assets. Unset paths disable the
/// corresponding capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// 68-point landmark model (LBF facemark)
    pub landmark_model: Option<PathBuf>,
    /// Frontal face Haar cascade
    pub face_cascade: Option<PathBuf>,
    /// Eye Haar cascade
    pub eye_cascade: Option<PathBuf>,
    /// Emotion classifier (ONNX, 64x64 grayscale input, 7 outputs)
    pub emotion_model: Option<PathBuf>,
    /// TrueType font for the overlay label, replacing the bundled one
    pub overlay_font: Option<PathBuf>,
}

/// Weights of the per-feature levels in the fused level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub eyebrow: f64,
    pub eyes: f64,
    pub mouth: f64,
    pub chin: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            eyebrow: 0.35,
            eyes: 0.30,
            mouth: 0.25,
            chin: 0.10,
        }
    }
}

/// Constants of the accurate estimation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub weights: FusionWeights,
    /// Blend factor of the exponential moving average
    pub ema_alpha: f64,
    /// Raw values retained per feature
    pub history_capacity: usize,
    /// Samples required before a feature is scored
    pub min_samples: usize,
    /// Frames between emotion classifier runs
    pub emotion_interval: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            ema_alpha: crate::core::smoothing::DEFAULT_ALPHA,
            history_capacity: crate::core::normalizer::DEFAULT_HISTORY_CAPACITY,
            min_samples: crate::core::normalizer::DEFAULT_MIN_SAMPLES,
            emotion_interval: crate::core::emotion::DEFAULT_EMOTION_INTERVAL,
        }
    }
}

/// Capture loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Pause between loop iterations
    #[serde(with = "duration_serde")]
    pub loop_interval: Duration,
    /// Pause after a failed frame read
    #[serde(with = "duration_serde")]
    pub read_retry: Duration,
    /// Frames wider than this are downscaled
    pub max_width: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            loop_interval: Duration::from_millis(30),
            read_retry: Duration::from_millis(10),
            max_width: 800,
        }
    }
}

/// Streaming endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Summary stream poll period
    #[serde(with = "duration_serde")]
    pub summary_poll: Duration,
    /// Video stream period between parts
    #[serde(with = "duration_serde")]
    pub video_poll: Duration,
    /// Video stream wait while no frame is published
    #[serde(with = "duration_serde")]
    pub idle_poll: Duration,
    /// Video stream wait after a failed encode
    #[serde(with = "duration_serde")]
    pub encode_retry: Duration,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            summary_poll: Duration::from_millis(200),
            video_poll: Duration::from_millis(66),
            idle_poll: Duration::from_millis(50),
            encode_retry: Duration::from_millis(10),
            jpeg_quality: 80,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
