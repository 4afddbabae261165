//! water-meter-ocr - run the OCR stages on an image file
//!
//! Each subcommand runs a single stage and prints its result as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use water_meter_ocr::config::{self, PipelineConfig};
use water_meter_ocr::storage;
use water_meter_ocr::vision::preprocess::{rgba_to_bgra, rotate_180};
use water_meter_ocr::{ModelPaths, OcrPipeline, PixelImage};

/// Water-meter OCR over PaddleOCR ONNX models
#[derive(Parser, Debug)]
#[command(name = "water-meter-ocr")]
#[command(about = "Detect, orient and read water-meter digits with ONNX Runtime")]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding det.onnx, cls.onnx and rec.onnx
    #[arg(short, long, global = true)]
    models: Option<PathBuf>,

    /// Detection model file
    #[arg(long, global = true)]
    det: Option<PathBuf>,

    /// Direction classifier model file
    #[arg(long, global = true)]
    cls: Option<PathBuf>,

    /// Recognition model file
    #[arg(long, global = true)]
    rec: Option<PathBuf>,

    /// Character dictionary for the recognition model
    #[arg(long, global = true)]
    dict: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect text regions in a full image
    Detect {
        /// Image file, already sized for the detection model
        image: PathBuf,
    },
    /// Classify a cropped text line as upright or rotated 180 degrees
    Classify {
        /// Cropped text line image
        image: PathBuf,
    },
    /// Read the digits of a cropped text line
    Recognize {
        /// Cropped text line image
        image: PathBuf,

        /// Run the direction classifier first and flip upside-down lines
        #[arg(long)]
        auto_rotate: bool,
    },
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = load_or_default_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    let paths = config
        .models
        .resolve()
        .context("Model paths not configured: pass --models or --det/--cls/--rec")?;

    let mut pipeline = OcrPipeline::new(&paths, config)?;

    let output = match &args.command {
        Command::Detect { image } => {
            let (data, width, height) = load_bgra(image)?;
            let image = PixelImage::new(&data, width, height)?;
            let detections = pipeline.detect(&image)?;
            json!({ "detections": detections })
        }
        Command::Classify { image } => {
            let (data, width, height) = load_bgra(image)?;
            let image = PixelImage::new(&data, width, height)?;
            json!({ "orientation": pipeline.classify(&image)? })
        }
        Command::Recognize { image, auto_rotate } => {
            let (mut data, width, height) = load_bgra(image)?;

            if *auto_rotate {
                let orientation = pipeline.classify(&PixelImage::new(&data, width, height)?)?;
                if orientation.needs_rotation() {
                    info!("Text line is upside down (score {:.3}), rotating", orientation.score);
                    let rotated = rotate_180(&PixelImage::new(&data, width, height)?)?;
                    data = rotated;
                }
            }

            let image = PixelImage::new(&data, width, height)?;
            json!({ "recognition": pipeline.recognize(&image)? })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Load configuration from an explicit file or the default location
///
/// Falls back to defaults, writing them to the default location on first run.
fn load_or_default_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    let path = match storage::default_config_path() {
        Ok(path) => path,
        Err(e) => {
            warn!("{}", e);
            info!("Using default configuration");
            return Ok(PipelineConfig::default());
        }
    };

    if path.exists() {
        match config::load_config(&path) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", path);
                return Ok(config);
            }
            Err(e) => warn!("Ignoring unreadable configuration {:?}: {}", path, e),
        }
        info!("Using default configuration");
        return Ok(PipelineConfig::default());
    }

    let config = PipelineConfig::default();
    match write_default_config(&config, &path) {
        Ok(()) => info!("Wrote default configuration to {:?}", path),
        Err(e) => warn!("Could not write default configuration: {:#}", e),
    }
    Ok(config)
}

/// First run: leave an editable copy of the defaults in the config directory
fn write_default_config(config: &PipelineConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {:?}", dir))?;
    }
    config::save_config(config, path)
}

/// Command-line paths take precedence over the configuration file
fn apply_overrides(config: &mut PipelineConfig, args: &Args) {
    if let Some(dir) = &args.models {
        let defaults = ModelPaths::from_dir(dir);
        config.models.dir = Some(dir.clone());
        config.models.detection = Some(defaults.detection);
        config.models.classification = Some(defaults.classification);
        config.models.recognition = Some(defaults.recognition);
    }
    if let Some(det) = &args.det {
        config.models.detection = Some(det.clone());
    }
    if let Some(cls) = &args.cls {
        config.models.classification = Some(cls.clone());
    }
    if let Some(rec) = &args.rec {
        config.models.recognition = Some(rec.clone());
    }
    if let Some(dict) = &args.dict {
        config.recognition.dictionary_path = Some(dict.clone());
    }
}

/// Decode an image file into a BGRA buffer
fn load_bgra(path: &Path) -> Result<(Vec<u8>, u32, u32)> {
    let img = image::open(path)
        .with_context(|| format!("Failed to load image: {:?}", path))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    Ok((rgba_to_bgra(img.as_raw()), width, height))
}
