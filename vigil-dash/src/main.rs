// vigil - surveillance dashboard
// Emotion bars from the microphone and processed camera feeds

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use vigil_dash::{start_audio, telemetry, Dashboard, DashboardConfig, LogSink};
use vigil_eye::{default_provider, discover_cameras};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Surveillance dashboard: live emotion bars and relayed camera feeds", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dashboard until Ctrl-C
    Run {
        /// Configuration file (JSON, TOML or YAML)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Camera index to open (repeatable)
        #[arg(long = "camera", value_name = "ID")]
        cameras: Vec<u32>,

        /// Do not start the audio worker
        #[arg(long)]
        no_audio: bool,

        /// Log level (error, warn, info, debug, trace)
        #[arg(long)]
        log_level: Option<String>,
    },

    /// List cameras that deliver frames
    Cameras {
        /// Probe indices 0..N
        #[arg(long, default_value = "10")]
        max_index: u32,
    },

    /// List audio input devices
    AudioDevices,

    /// Validate a configuration file and print the effective configuration
    CheckConfig {
        #[arg(long, short)]
        config: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<DashboardConfig> {
    let mut config = match path {
        Some(path) => DashboardConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => DashboardConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            cameras,
            no_audio,
            log_level,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(level) = log_level {
                config.log.level = level;
            }
            if no_audio {
                config.audio.enabled = false;
            }
            config.validate()?;
            telemetry::init(&config.log)?;

            run(config, cameras).await
        }

        Commands::Cameras { max_index } => {
            let config = load_config(None)?;
            telemetry::init(&config.log)?;

            let found = discover_cameras(
                default_provider(),
                max_index,
                config.cameras.request_format,
                Vec::new(),
            )
            .await?;
            if found.is_empty() {
                println!("No cameras found");
            }
            for index in found {
                println!("{}", index);
            }
            Ok(())
        }

        Commands::AudioDevices => {
            let config = load_config(None)?;
            telemetry::init(&config.log)?;

            let devices = vigil_sc::list_devices()?;
            if devices.is_empty() {
                println!("No audio input devices found");
            }
            for name in devices {
                println!("{}", name);
            }
            Ok(())
        }

        Commands::CheckConfig { config } => {
            let config = load_config(Some(&config))?;
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run(config: DashboardConfig, cameras: Vec<u32>) -> anyhow::Result<()> {
    info!("Starting vigil");

    let audio = if config.audio.enabled {
        match start_audio(&config.audio) {
            Ok(audio) => Some(audio),
            Err(e) => {
                warn!("Audio disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let dashboard = Dashboard::start(&config, default_provider(), Arc::new(LogSink), audio).await?;
    let opened = dashboard.open_cameras(&cameras).await;
    info!("Streaming {} of {} requested cameras", opened.len(), cameras.len());

    wait_for_shutdown().await;
    dashboard.shutdown().await?;
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
