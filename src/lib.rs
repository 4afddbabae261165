//! Water-meter OCR - on-device digit reading
//!
//! Runs the PaddleOCR detection, direction-classification and recognition
//! models through ONNX Runtime on a packed BGRA pixel buffer.
//!
//! [`vision::OcrPipeline`] exposes each stage with typed errors;
//! [`handle::PipelineHandle`] is the host-facing surface that turns every
//! failure into a sentinel value.

pub mod config;
pub mod error;
pub mod handle;
pub mod storage;
pub mod vision;

pub use config::PipelineConfig;
pub use error::{ErrorCategory, OcrError, OcrResult};
pub use handle::{HandleState, PipelineHandle};
pub use vision::{
    Detection, ModelPaths, ModelStage, OcrPipeline, Orientation, PixelImage, Recognition,
    Rotation, Vocabulary,
};
