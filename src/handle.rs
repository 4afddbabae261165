//! Host-facing pipeline handle
//!
//! Every call either succeeds or returns a sentinel (`None`, or an invalid
//! handle from `init`). Errors and panics are logged and stopped here; a
//! failed call leaves the handle usable for the next one.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use tracing::{error, warn};

use crate::config::PipelineConfig;
use crate::error::{OcrError, OcrResult};
use crate::vision::{Detection, ModelPaths, OcrPipeline, Orientation, PixelImage};

/// Lifecycle state of a [`PipelineHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// All three sessions are loaded
    Initialized,
    /// Initialization failed; nothing was retained
    Invalid,
    /// Resources were released by `dispose`
    Disposed,
}

enum Slot {
    Ready(Box<OcrPipeline>),
    Invalid,
    Disposed,
}

/// Owned handle over a fully initialized pipeline, or an invalid one
pub struct PipelineHandle {
    slot: Slot,
}

impl PipelineHandle {
    /// Load the detection, classification and recognition models
    ///
    /// Returns an invalid handle if any model fails to load.
    pub fn init(det_model: &Path, cls_model: &Path, rec_model: &Path) -> Self {
        Self::init_with_config(
            &ModelPaths::new(det_model, cls_model, rec_model),
            PipelineConfig::default(),
        )
    }

    /// Load the models with explicit settings
    pub fn init_with_config(paths: &ModelPaths, config: PipelineConfig) -> Self {
        match guarded("init", || OcrPipeline::new(paths, config)) {
            Some(pipeline) => Self {
                slot: Slot::Ready(Box::new(pipeline)),
            },
            None => Self::invalid(),
        }
    }

    /// A handle that was never initialized
    pub fn invalid() -> Self {
        Self { slot: Slot::Invalid }
    }

    pub fn state(&self) -> HandleState {
        match self.slot {
            Slot::Ready(_) => HandleState::Initialized,
            Slot::Invalid => HandleState::Invalid,
            Slot::Disposed => HandleState::Disposed,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state() == HandleState::Initialized
    }

    /// Detect text regions; `None` on failure, empty on no detections
    pub fn detect(&mut self, image: &PixelImage<'_>) -> Option<Vec<Detection>> {
        self.call("detect", |pipeline| pipeline.detect(image))
    }

    /// Classify a cropped text line's orientation
    pub fn classify(&mut self, image: &PixelImage<'_>) -> Option<Orientation> {
        self.call("classify", |pipeline| pipeline.classify(image))
    }

    /// Recognize the text of a cropped text line
    pub fn recognize(&mut self, image: &PixelImage<'_>) -> Option<String> {
        self.call("recognize", |pipeline| pipeline.recognize(image))
            .map(|recognition| recognition.text)
    }

    /// Release all sessions
    ///
    /// Calling it again, or on an invalid handle, does nothing.
    pub fn dispose(&mut self) {
        match std::mem::replace(&mut self.slot, Slot::Disposed) {
            Slot::Ready(pipeline) => drop(pipeline),
            Slot::Invalid => {
                self.slot = Slot::Invalid;
            }
            Slot::Disposed => {
                warn!("dispose called on an already disposed OCR handle");
            }
        }
    }

    fn call<T>(
        &mut self,
        op: &str,
        f: impl FnOnce(&mut OcrPipeline) -> OcrResult<T>,
    ) -> Option<T> {
        let Slot::Ready(pipeline) = &mut self.slot else {
            error!("Error in {}: {}", op, OcrError::InvalidHandle);
            return None;
        };
        guarded(op, || f(&mut **pipeline))
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if matches!(self.slot, Slot::Ready(_)) {
            self.dispose();
        }
    }
}

/// Run `f`, converting errors and panics into `None`
fn guarded<T>(op: &str, f: impl FnOnce() -> OcrResult<T>) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!("Error in {}: {} ({:?})", op, e, e.category());
            None
        }
        Err(payload) => {
            error!("Panic in {}: {}", op, panic_message(payload.as_ref()));
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
