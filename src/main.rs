//! Synheart Stress Agent CLI
//!
//! Camera-based stress level sensor with live summary and video streams.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use synheart_stress_agent::{
    capture::{default_backend, SessionController},
    config::Config,
    providers::ProviderSet,
    server::{self, ServerConfig},
    PRIVACY_DECLARATION, VERSION,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "synheart-stress")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Camera-based stress level sensor with live streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server until Ctrl+C
    Serve {
        /// Address to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config and PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Camera index opened when a start request names none
        #[arg(long)]
        device: Option<i32>,
    },

    /// Show configuration and model availability
    Status,

    /// Display privacy declaration
    Privacy,

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, device } => {
            init_tracing();
            cmd_serve(host, port, device).await;
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Privacy => {
            cmd_privacy();
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(env_filter)
        .init();
}

fn load_config() -> Config {
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });
    config.apply_env();
    config
}

async fn cmd_serve(host: Option<String>, port: Option<u16>, device: Option<i32>) {
    let mut config = load_config();
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(device) = device {
        config.device_index = device;
    }

    println!("{PRIVACY_DECLARATION}");

    let sessions = Arc::new(SessionController::from_config(&config, default_backend()));

    let (addr, shutdown_tx) =
        match server::run(ServerConfig::from_config(&config), sessions.clone()).await {
            Ok(running) => running,
            Err(e) => {
                tracing::error!("Failed to start server: {e:#}");
                std::process::exit(1);
            }
        };

    println!("Synheart Stress Agent v{VERSION}");
    println!("Listening on http://{addr}");
    println!("  POST /start    start the camera session");
    println!("  GET  /stream   summary events");
    println!("  GET  /video    annotated MJPEG stream");
    println!();
    println!("Press Ctrl+C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
    }

    println!("\nShutting down...");
    let _ = shutdown_tx.send(());

    match tokio::task::spawn_blocking(move || sessions.stop()).await {
        Ok(_) => tracing::info!("Camera released"),
        Err(e) => tracing::error!("Failed to stop capture session: {e}"),
    }

    println!("Session ended.");
}

fn cmd_status() {
    let config = load_config();
    let backend = default_backend();
    let providers = ProviderSet::from_config(&config.models);

    println!("Synheart Stress Agent Status");
    println!("============================");
    println!();

    println!("Camera backend: {}", backend.name());
    println!("Default device: {}", config.device_index);
    println!("Server: {}:{}", config.server.host, config.server.port);
    println!();

    println!("Models:");
    match &providers.landmarks {
        Ok(_) => println!("  Landmark detector: ready ✓"),
        Err(e) => println!("  Landmark detector: unavailable ✗ ({e})"),
    }
    match &providers.emotion {
        Ok(_) => println!("  Emotion classifier: ready ✓"),
        Err(e) => println!("  Emotion classifier: unavailable ✗ ({e})"),
    }
    println!(
        "  Heuristic detector: {}",
        if providers.heuristic.is_some() {
            "ready ✓"
        } else {
            "unavailable ✗"
        }
    );
    println!(
        "  Estimator mode: {}",
        if providers.accurate_ready() {
            "accurate"
        } else {
            "heuristic"
        }
    );
    println!(
        "  Overlay label: {}",
        if config.models.overlay_font.is_some() {
            "configured font"
        } else {
            "bundled font"
        }
    );
    println!();

    println!("Capture:");
    println!("  Loop interval: {}ms", config.capture.loop_interval.as_millis());
    println!("  Max frame width: {}px", config.capture.max_width);
}

fn cmd_privacy() {
    println!("{PRIVACY_DECLARATION}");
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
