//! ReelSight CLI
//!
//! Headless front-end over `reelsight-core`: probe containers, annotate
//! single images, run the full video pipeline, and fetch the demo clip.
//! Machine-readable results go to stdout as JSON; logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use reelsight_core::detector::{Detector, DetectorConfig, OnnxDetector};
use reelsight_core::media::detect_system_ffmpeg;
use reelsight_core::pipeline::{annotate_image, annotate_video, probe_media};
use reelsight_core::settings::{ServiceSettings, SettingsManager};

#[derive(Parser)]
#[command(name = "reelsight", version, about = "Object-detection annotation for video and images")]
struct Cli {
    /// Settings file directory (defaults to the platform config directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print container metadata as JSON
    Probe {
        /// Media file to inspect
        input: PathBuf,
    },

    /// Detect objects in a single image
    Image {
        /// Image file to annotate
        input: PathBuf,

        /// Where to write the annotated copy (defaults to `<input>.annotated.png`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the full video annotation pipeline
    Video {
        /// Video file to annotate
        input: PathBuf,

        /// Where to write the annotated MP4
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Download the demo clip into the current directory
    FetchDemo {
        /// Target directory
        #[arg(default_value = ".")]
        dest: PathBuf,
    },
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let settings = load_settings(cli.config_dir.clone());

    if let Some(dir) = &settings.ffmpeg_dir {
        std::env::set_var(reelsight_core::media::FFMPEG_DIR_ENV, dir);
    }

    match cli.command {
        Commands::Probe { input } => {
            let ffmpeg = detect_system_ffmpeg().context("locating ffmpeg")?;
            let media = probe_media(&ffmpeg, &input)?;
            println!("{}", serde_json::to_string_pretty(&media)?);
        }

        Commands::Image { input, output } => {
            let detector = load_detector(&settings)?;
            let outcome = annotate_image(&detector, &input)?;

            let output = output.unwrap_or_else(|| input.with_extension("annotated.png"));
            outcome
                .image
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;

            info!(output = %output.display(), "annotated image written");
            println!("{}", serde_json::to_string_pretty(&outcome.detections)?);
        }

        Commands::Video { input, output } => {
            let ffmpeg = detect_system_ffmpeg().context("locating ffmpeg")?;
            let detector = load_detector(&settings)?;

            let artifact = annotate_video(&ffmpeg, &detector, &input, &output, &settings.encode)?;
            println!(
                "{}",
                serde_json::json!({
                    "path": artifact.path,
                    "frames": artifact.frames,
                    "width": artifact.geometry.width,
                    "height": artifact.geometry.height,
                    "fps": artifact.geometry.fps,
                })
            );
        }

        Commands::FetchDemo { dest } => {
            let path = reelsight_core::assets::fetch_demo_video(&dest)?;
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(config_dir: Option<PathBuf>) -> ServiceSettings {
    let manager = match config_dir {
        Some(dir) => SettingsManager::new(dir),
        None => SettingsManager::from_default_location(),
    };
    manager.load()
}

fn load_detector(settings: &ServiceSettings) -> Result<impl Detector> {
    let config = DetectorConfig {
        confidence_threshold: settings.model.confidence_threshold,
        nms_threshold: settings.model.nms_threshold,
        input_size: settings.model.input_size,
        ..DetectorConfig::default()
    };
    OnnxDetector::load(&settings.model.path, config)
        .with_context(|| format!("loading model {}", settings.model.path.display()))
}
