//! Error types for the OCR pipeline
//!
//! Internal helpers work with `anyhow` and attach context; every stage
//! boundary converts those into an [`OcrError`] so callers can tell an
//! initialization failure from a per-call failure.

use thiserror::Error;

use crate::vision::models::ModelStage;

/// Pipeline error
#[derive(Debug, Error)]
pub enum OcrError {
    /// A model could not be loaded or the runtime could not be set up
    #[error("initialization failed: {reason}")]
    Init { reason: String },

    /// The handle was never initialized, failed to initialize, or was disposed
    #[error("pipeline handle is not initialized")]
    InvalidHandle,

    /// The pixel buffer is smaller than its declared dimensions
    #[error("pixel buffer holds {actual} bytes, {width}x{height} image needs {expected}")]
    Encoding {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// The runtime raised while running a session
    #[error("{stage} inference failed: {reason}")]
    Inference { stage: ModelStage, reason: String },

    /// The input tensor does not match the dimensions the model declares
    #[error("{stage} model expects input {expected:?}, got {actual:?}")]
    ShapeMismatch {
        stage: ModelStage,
        expected: Vec<i64>,
        actual: Vec<usize>,
    },

    /// The output tensor could not be interpreted
    #[error("cannot decode output: {reason}")]
    Decode { reason: String },
}

/// Coarse failure category, one per kind of sentinel the host may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Init,
    Inference,
    Encoding,
    Decode,
}

impl OcrError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            OcrError::Init { .. } => ErrorCategory::Init,
            OcrError::InvalidHandle | OcrError::Inference { .. } | OcrError::ShapeMismatch { .. } => {
                ErrorCategory::Inference
            }
            OcrError::Encoding { .. } => ErrorCategory::Encoding,
            OcrError::Decode { .. } => ErrorCategory::Decode,
        }
    }

    pub(crate) fn init(err: anyhow::Error) -> Self {
        OcrError::Init {
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn inference(stage: ModelStage, err: impl std::fmt::Display) -> Self {
        OcrError::Inference {
            stage,
            reason: err.to_string(),
        }
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        OcrError::Decode {
            reason: reason.into(),
        }
    }
}

pub type OcrResult<T> = std::result::Result<T, OcrError>;
