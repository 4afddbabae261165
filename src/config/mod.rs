//! Pipeline Configuration
//!
//! Runtime, threshold and model-location settings stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vision::detection::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::vision::models::ModelPaths;
use crate::vision::orientation::DEFAULT_ROTATE_THRESHOLD;

/// Pipeline settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// ONNX Runtime settings
    pub runtime: RuntimeSettings,
    /// Detection settings
    pub detection: DetectionSettings,
    /// Orientation classifier settings
    pub orientation: OrientationSettings,
    /// Recognition settings
    pub recognition: RecognitionSettings,
    /// Model file locations
    pub models: ModelSettings,
}

/// ONNX Runtime settings shared by all three sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Name of the process-wide runtime environment
    pub environment_name: String,
    /// Intra-op threads per session
    pub intra_threads: usize,
    /// Graph optimization level (0 = disabled, 3 = all)
    pub optimization_level: u8,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            environment_name: "WaterOCR".to_string(),
            intra_threads: 1,
            optimization_level: 3,
        }
    }
}

/// Detection decoding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Candidates must score strictly above this (0.0 - 1.0)
    pub confidence_threshold: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Orientation decoding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationSettings {
    /// Minimum "180" score before a line is reported as rotated
    pub rotate_threshold: f32,
}

impl Default for OrientationSettings {
    fn default() -> Self {
        Self {
            rotate_threshold: DEFAULT_ROTATE_THRESHOLD,
        }
    }
}

/// Recognition settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Character dictionary; the built-in digit table is used when unset
    pub dictionary_path: Option<PathBuf>,
}

/// Model file locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Directory holding det.onnx, cls.onnx and rec.onnx
    pub dir: Option<PathBuf>,
    pub detection: Option<PathBuf>,
    pub classification: Option<PathBuf>,
    pub recognition: Option<PathBuf>,
}

impl ModelSettings {
    /// Resolve the three model paths
    ///
    /// Explicit per-stage paths win over files in `dir`. Returns `None` when
    /// a stage has neither.
    pub fn resolve(&self) -> Option<ModelPaths> {
        let defaults = self.dir.as_deref().map(ModelPaths::from_dir);
        let pick = |explicit: &Option<PathBuf>, fallback: Option<&PathBuf>| {
            explicit.clone().or_else(|| fallback.cloned())
        };

        Some(ModelPaths {
            detection: pick(&self.detection, defaults.as_ref().map(|d| &d.detection))?,
            classification: pick(&self.classification, defaults.as_ref().map(|d| &d.classification))?,
            recognition: pick(&self.recognition, defaults.as_ref().map(|d| &d.recognition))?,
        })
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: PipelineConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &PipelineConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
