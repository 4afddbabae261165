//! Text detection output decoding
//!
//! The detection model emits a (1, N, F) tensor: one row per candidate
//! region, geometry first and the confidence at column 8. Rows at or below
//! the threshold are dropped; everything else is returned in model order.
//! No overlap suppression is applied.

use ndarray::{ArrayD, Axis, Ix3};
use serde::{Deserialize, Serialize};

use crate::error::{OcrError, OcrResult};

/// Default minimum confidence for a candidate to be kept (exclusive)
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Column holding the confidence score
const CONFIDENCE_INDEX: usize = 8;

/// Number of geometry fields (four corner points)
const GEOMETRY_FIELDS: usize = 8;

/// One candidate text region
///
/// Fields 0..7 are four (x, y) corner points, field 8 is the confidence.
/// Any extra columns the model produces are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Detection {
    fields: Vec<f32>,
}

impl TryFrom<Vec<f32>> for Detection {
    type Error = OcrError;

    fn try_from(fields: Vec<f32>) -> OcrResult<Self> {
        if fields.len() <= CONFIDENCE_INDEX {
            return Err(OcrError::decode(format!(
                "detection needs at least {} fields, got {}",
                CONFIDENCE_INDEX + 1,
                fields.len()
            )));
        }
        Ok(Self { fields })
    }
}

impl From<Detection> for Vec<f32> {
    fn from(detection: Detection) -> Self {
        detection.fields
    }
}

impl Detection {
    /// Raw feature row as produced by the model
    pub fn fields(&self) -> &[f32] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<f32> {
        self.fields
    }

    pub fn geometry(&self) -> &[f32] {
        &self.fields[..GEOMETRY_FIELDS]
    }

    pub fn confidence(&self) -> f32 {
        self.fields[CONFIDENCE_INDEX]
    }

    /// Geometry as four corner points
    pub fn quad(&self) -> [(f32, f32); 4] {
        let g = self.geometry();
        [(g[0], g[1]), (g[2], g[3]), (g[4], g[5]), (g[6], g[7])]
    }

    /// Axis-aligned bounding box (x, y, width, height)
    pub fn bounds(&self) -> (u32, u32, u32, u32) {
        polygon_to_bounds(&self.quad())
    }
}

/// Decode the detection model output
pub fn decode_detections(output: &ArrayD<f32>, threshold: f32) -> OcrResult<Vec<Detection>> {
    let shape = output.shape();
    if shape.len() != 3 {
        return Err(OcrError::decode(format!(
            "detection output must be [1, N, F], got {:?}",
            shape
        )));
    }

    let (batches, rows, features) = (shape[0], shape[1], shape[2]);
    if batches == 0 || rows == 0 || features <= CONFIDENCE_INDEX {
        return Ok(vec![]);
    }

    let batch = output
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|e| OcrError::decode(e.to_string()))?;

    Ok(batch
        .index_axis(Axis(0), 0)
        .rows()
        .into_iter()
        .filter(|row| row[CONFIDENCE_INDEX] > threshold)
        .map(|row| Detection {
            fields: row.to_vec(),
        })
        .collect())
}

/// Convert polygon points to bounding box
fn polygon_to_bounds(polygon: &[(f32, f32)]) -> (u32, u32, u32, u32) {
    if polygon.is_empty() {
        return (0, 0, 0, 0);
    }

    let min_x = polygon.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let min_y = polygon.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_x = polygon.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let max_y = polygon.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

    (
        min_x.max(0.0) as u32,
        min_y.max(0.0) as u32,
        (max_x - min_x).max(0.0) as u32,
        (max_y - min_y).max(0.0) as u32,
    )
}
