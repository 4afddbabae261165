//! Vision/OCR Layer
//!
//! Three-stage PaddleOCR pipeline over ONNX Runtime:
//! - text detection (DBNet) producing scored quadrilaterals
//! - text direction classification (0 / 180 degrees)
//! - text recognition (CRNN) with greedy CTC decoding
//!
//! Each stage is invoked on its own. Cropping detected regions and feeding
//! them to recognition is left to the caller.

pub mod detection;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod models;
pub mod orientation;
pub mod preprocess;
pub mod recognition;

use ndarray::ArrayD;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{OcrError, OcrResult};

pub use detection::Detection;
pub use models::{ModelPaths, ModelStage, SessionSet};
pub use orientation::{Orientation, Rotation};
pub use preprocess::{PixelImage, PlanarTensor};
pub use recognition::{CtcDecoder, Recognition, Vocabulary};

/// Loaded OCR pipeline
///
/// Stage calls take `&mut self`: one call in flight per pipeline.
pub struct OcrPipeline {
    sessions: SessionSet,
    decoder: CtcDecoder,
    config: PipelineConfig,
}

impl OcrPipeline {
    /// Load all three models and the recognition vocabulary
    pub fn new(paths: &ModelPaths, config: PipelineConfig) -> OcrResult<Self> {
        info!(
            "Initializing OCR with models: det={:?}, cls={:?}, rec={:?}",
            paths.detection, paths.classification, paths.recognition
        );

        let vocabulary = match &config.recognition.dictionary_path {
            Some(path) => Vocabulary::from_file(path).map_err(OcrError::init)?,
            None => Vocabulary::digits(),
        };

        let sessions = SessionSet::load(paths, &config.runtime).map_err(OcrError::init)?;

        info!("OCR initialized ({} recognition symbols)", vocabulary.len());
        Ok(Self {
            sessions,
            decoder: CtcDecoder::new(vocabulary),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        self.decoder.vocabulary()
    }

    /// Detect text regions in a full meter image
    pub fn detect(&mut self, image: &PixelImage<'_>) -> OcrResult<Vec<Detection>> {
        let start = Instant::now();
        let output = self.run_stage(ModelStage::Detection, image)?;
        let detections =
            detection::decode_detections(&output, self.config.detection.confidence_threshold)?;

        debug!(
            "Detection complete in {:?}: {} region(s)",
            start.elapsed(),
            detections.len()
        );
        Ok(detections)
    }

    /// Classify whether a cropped text line is upside down
    pub fn classify(&mut self, image: &PixelImage<'_>) -> OcrResult<Orientation> {
        let output = self.run_stage(ModelStage::Classification, image)?;
        let orientation =
            orientation::decode_orientation(&output, self.config.orientation.rotate_threshold)?;

        debug!(
            "Orientation: {:?} (score {:.3})",
            orientation.rotation, orientation.score
        );
        Ok(orientation)
    }

    /// Recognize the text of a cropped, upright text line
    pub fn recognize(&mut self, image: &PixelImage<'_>) -> OcrResult<Recognition> {
        let start = Instant::now();
        let output = self.run_stage(ModelStage::Recognition, image)?;
        let recognition = self.decoder.decode(&output)?;

        debug!(
            "Recognition complete in {:?}: {:?} ({:.3})",
            start.elapsed(),
            recognition.text,
            recognition.confidence
        );
        Ok(recognition)
    }

    /// Encode, run one session and hand back its first output
    fn run_stage(&mut self, stage: ModelStage, image: &PixelImage<'_>) -> OcrResult<ArrayD<f32>> {
        let tensor = preprocess::encode(image)?;
        self.sessions
            .run(stage, tensor)?
            .into_iter()
            .next()
            .ok_or_else(|| OcrError::decode(format!("{stage} model produced no outputs")))
    }
}

impl Drop for OcrPipeline {
    fn drop(&mut self) {
        info!("OCR resources disposed");
    }
}
