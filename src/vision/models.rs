//! Model management for ONNX Runtime
//!
//! Owns the process-wide runtime environment and the three PaddleOCR
//! sessions (detection, direction classifier, recognition). Nothing outside
//! this module touches an `ort::Session` directly.

use anyhow::{bail, Context, Result};
use ndarray::ArrayD;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, info};

use super::preprocess::PlanarTensor;
use crate::config::RuntimeSettings;
use crate::error::{OcrError, OcrResult};

/// Model identifier for PaddleOCR components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelStage {
    /// Text detection model (DBNet)
    Detection,
    /// Text direction classifier
    Classification,
    /// Text recognition model (CRNN)
    Recognition,
}

impl ModelStage {
    /// All stages in load order
    pub const ALL: [ModelStage; 3] = [
        ModelStage::Detection,
        ModelStage::Classification,
        ModelStage::Recognition,
    ];

    /// Get the default filename for this model
    pub fn filename(&self) -> &'static str {
        match self {
            ModelStage::Detection => "det.onnx",
            ModelStage::Classification => "cls.onnx",
            ModelStage::Recognition => "rec.onnx",
        }
    }

    /// Display name for logging
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelStage::Detection => "Text Detection",
            ModelStage::Classification => "Text Direction Classifier",
            ModelStage::Recognition => "Text Recognition",
        }
    }
}

impl fmt::Display for ModelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelStage::Detection => "detection",
            ModelStage::Classification => "classification",
            ModelStage::Recognition => "recognition",
        };
        f.write_str(name)
    }
}

/// Paths to the three model files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub detection: PathBuf,
    pub classification: PathBuf,
    pub recognition: PathBuf,
}

impl ModelPaths {
    pub fn new(
        detection: impl Into<PathBuf>,
        classification: impl Into<PathBuf>,
        recognition: impl Into<PathBuf>,
    ) -> Self {
        Self {
            detection: detection.into(),
            classification: classification.into(),
            recognition: recognition.into(),
        }
    }

    /// Default file names inside a models directory
    pub fn from_dir(dir: &Path) -> Self {
        Self {
            detection: dir.join(ModelStage::Detection.filename()),
            classification: dir.join(ModelStage::Classification.filename()),
            recognition: dir.join(ModelStage::Recognition.filename()),
        }
    }

    /// Get the path for a specific stage
    pub fn path(&self, stage: ModelStage) -> &Path {
        match stage {
            ModelStage::Detection => &self.detection,
            ModelStage::Classification => &self.classification,
            ModelStage::Recognition => &self.recognition,
        }
    }

    /// Stages whose model file does not exist
    pub fn missing(&self) -> Vec<ModelStage> {
        ModelStage::ALL
            .into_iter()
            .filter(|&stage| !self.path(stage).is_file())
            .collect()
    }
}

struct EnvironmentRegistry {
    current: Weak<InferenceEnvironment>,
    committed: bool,
}

/// Live environment, if any session set still holds it
static ENVIRONMENT: Mutex<EnvironmentRegistry> = parking_lot::const_mutex(EnvironmentRegistry {
    current: Weak::new(),
    committed: false,
});

/// Process-wide ONNX Runtime environment
///
/// The runtime is committed at most once per process, by the first session
/// set that needs it. Every [`SessionSet`] keeps an `Arc` so the environment
/// outlives all sessions; it is released when the last set is dropped and
/// re-acquired on the next load.
#[derive(Debug)]
pub struct InferenceEnvironment {
    name: String,
}

impl InferenceEnvironment {
    /// Get the shared environment, creating it on first use
    pub fn shared(settings: &RuntimeSettings) -> Result<Arc<Self>> {
        let mut registry = ENVIRONMENT.lock();

        if let Some(env) = registry.current.upgrade() {
            debug!("Reusing ONNX Runtime environment '{}'", env.name);
            return Ok(env);
        }

        if !registry.committed {
            ort::init()
                .with_name(settings.environment_name.clone())
                .commit()
                .context("Failed to initialize ONNX Runtime environment")?;
            registry.committed = true;
            info!("ONNX Runtime environment '{}' initialized", settings.environment_name);
        }

        let env = Arc::new(Self {
            name: settings.environment_name.clone(),
        });
        registry.current = Arc::downgrade(&env);
        Ok(env)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for InferenceEnvironment {
    fn drop(&mut self) {
        debug!("ONNX Runtime environment '{}' released", self.name);
    }
}

/// ONNX Runtime session wrapper
pub struct OnnxSession {
    stage: ModelStage,
    session: Session,
    input_name: String,
    input_shape: Vec<i64>,
    output_names: Vec<String>,
}

impl OnnxSession {
    /// Load a model file for the given stage
    pub fn load(stage: ModelStage, model_path: &Path, settings: &RuntimeSettings) -> Result<Self> {
        info!("Loading {} model from {:?}", stage.display_name(), model_path);

        if !model_path.is_file() {
            bail!("{} model not found: {}", stage.display_name(), model_path.display());
        }

        let session = Session::builder()?
            .with_optimization_level(optimization_level(settings.optimization_level))?
            .with_intra_threads(settings.intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!(
                    "Failed to load {} model from {}",
                    stage.display_name(),
                    model_path.display()
                )
            })?;

        let Some(input) = session.inputs.first() else {
            bail!("{} model declares no inputs", stage.display_name());
        };
        let input_name = input.name.clone();
        let input_shape = extract_shape(&input.input_type);

        let output_names: Vec<String> = session
            .outputs
            .iter()
            .map(|output| output.name.clone())
            .collect();

        info!(
            "{} model loaded. Input: {} {:?}, Outputs: {:?}",
            stage.display_name(),
            input_name,
            input_shape,
            output_names
        );

        Ok(Self {
            stage,
            session,
            input_name,
            input_shape,
            output_names,
        })
    }

    pub fn stage(&self) -> ModelStage {
        self.stage
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    /// Declared input shape; non-positive entries are dynamic
    pub fn input_shape(&self) -> &[i64] {
        &self.input_shape
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// Run one input through the model and return every output tensor
    pub fn run(&mut self, tensor: PlanarTensor) -> OcrResult<Vec<ArrayD<f32>>> {
        let stage = self.stage;
        check_input_shape(stage, &self.input_shape, tensor.shape())?;

        let start = Instant::now();
        let input = Tensor::from_array(tensor.into_array())
            .map_err(|e| OcrError::inference(stage, e))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| OcrError::inference(stage, e))?;

        let mut results = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let array = outputs[name.as_str()]
                .try_extract_array::<f32>()
                .map_err(|e| OcrError::inference(stage, format!("output '{name}': {e}")))?;
            results.push(array.to_owned());
        }

        debug!("{} inference complete in {:?}", stage, start.elapsed());
        Ok(results)
    }
}

/// The three sessions of one pipeline, sharing the process environment
pub struct SessionSet {
    detection: OnnxSession,
    classification: OnnxSession,
    recognition: OnnxSession,
    // Dropped after the sessions
    environment: Arc<InferenceEnvironment>,
}

impl SessionSet {
    /// Load all three models
    ///
    /// Any failure aborts the whole load. Sessions loaded before the
    /// failing one are dropped on the way out.
    pub fn load(paths: &ModelPaths, settings: &RuntimeSettings) -> Result<Self> {
        let missing = paths.missing();
        if !missing.is_empty() {
            let list: Vec<String> = missing
                .iter()
                .map(|&stage| format!("{} ({})", stage, paths.path(stage).display()))
                .collect();
            bail!("Model files not found: {}", list.join(", "));
        }

        let environment = InferenceEnvironment::shared(settings)?;

        let detection = OnnxSession::load(ModelStage::Detection, &paths.detection, settings)?;
        let classification =
            OnnxSession::load(ModelStage::Classification, &paths.classification, settings)?;
        let recognition = OnnxSession::load(ModelStage::Recognition, &paths.recognition, settings)?;

        info!(
            "OCR sessions ready ({} intra-op thread(s) per session)",
            settings.intra_threads
        );

        Ok(Self {
            detection,
            classification,
            recognition,
            environment,
        })
    }

    pub fn session(&self, stage: ModelStage) -> &OnnxSession {
        match stage {
            ModelStage::Detection => &self.detection,
            ModelStage::Classification => &self.classification,
            ModelStage::Recognition => &self.recognition,
        }
    }

    fn session_mut(&mut self, stage: ModelStage) -> &mut OnnxSession {
        match stage {
            ModelStage::Detection => &mut self.detection,
            ModelStage::Classification => &mut self.classification,
            ModelStage::Recognition => &mut self.recognition,
        }
    }

    /// Run a tensor through the named session
    pub fn run(&mut self, stage: ModelStage, tensor: PlanarTensor) -> OcrResult<Vec<ArrayD<f32>>> {
        self.session_mut(stage).run(tensor)
    }

    pub fn environment(&self) -> &InferenceEnvironment {
        &self.environment
    }
}

fn optimization_level(level: u8) -> GraphOptimizationLevel {
    match level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

/// Extract shape from ONNX value type
fn extract_shape(value_type: &ort::value::ValueType) -> Vec<i64> {
    if let Some(shape) = value_type.tensor_shape() {
        shape.iter().copied().collect()
    } else {
        vec![]
    }
}

/// Compare a tensor shape with the shape a model declares
///
/// Only fixed (positive) dimensions are checked. An empty declaration means
/// the model did not publish a shape.
fn check_input_shape(stage: ModelStage, expected: &[i64], actual: &[usize]) -> OcrResult<()> {
    if expected.is_empty() {
        return Ok(());
    }

    let matches = expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(&e, &a)| e <= 0 || e as usize == a);

    if matches {
        Ok(())
    } else {
        Err(OcrError::ShapeMismatch {
            stage,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}
