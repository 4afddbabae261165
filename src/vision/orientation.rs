//! Text line orientation
//!
//! The direction classifier scores each cropped line against two labels,
//! "0" and "180". Lines are only reported as rotated when the "180" class
//! wins with enough confidence; a marginal win leaves the line as-is.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::{OcrError, OcrResult};

/// Default minimum score before a line is flipped
pub const DEFAULT_ROTATE_THRESHOLD: f32 = 0.9;

/// Class labels in model output order
pub const LABELS: [&str; 2] = ["0", "180"];

/// Rotation state of a text line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    Upright,
    Rotated180,
}

impl Rotation {
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Upright => 0,
            Rotation::Rotated180 => 180,
        }
    }
}

/// Orientation decision for one text line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub rotation: Rotation,
    /// Score of the winning class
    pub score: f32,
}

impl Orientation {
    /// Whether the line must be turned 180 degrees before recognition
    pub fn needs_rotation(&self) -> bool {
        self.rotation == Rotation::Rotated180
    }
}

/// Decode the direction classifier output
///
/// Accepts (1, K) or (K) class scores, K >= 2.
pub fn decode_orientation(output: &ArrayD<f32>, threshold: f32) -> OcrResult<Orientation> {
    let scores: Vec<f32> = match output.shape() {
        [classes] => output.iter().take(*classes).copied().collect(),
        [_, classes] => output.iter().take(*classes).copied().collect(),
        shape => {
            return Err(OcrError::decode(format!(
                "classifier output must be [1, K] or [K], got {:?}",
                shape
            )))
        }
    };

    if scores.len() < LABELS.len() {
        return Err(OcrError::decode(format!(
            "classifier produced {} class score(s), expected at least {}",
            scores.len(),
            LABELS.len()
        )));
    }

    let (best, score) = scores
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |acc, (idx, s)| if s > acc.1 { (idx, s) } else { acc });

    let rotation = if best == 1 && score >= threshold {
        Rotation::Rotated180
    } else {
        Rotation::Upright
    };

    Ok(Orientation { rotation, score })
}
