//! Tiny ONNX graphs for exercising the sessions in tests
//!
//! The models are serialized by hand (protobuf wire format) so tests need
//! no model files on disk beyond a temp directory.
//!
//! - detection: input `x` [1, 3, 3, 3], reshaped to [1, 3, 9]. Row `c` is
//!   colour plane `c`, so field 8 (confidence) is the last pixel's channel.
//! - classification: input `x` [1, 3, 1, 1], reshaped to [1, 3]. The
//!   scores are the pixel's red, green and blue values.
//! - recognition, [`RecognitionFixture::Sequence`]: input `x`
//!   [1, 3, 1, W], reshaped and transposed to [1, W, 3]. Each column is a
//!   timestep scoring blank (red), `0` (green) and `1` (blue).
//! - recognition, [`RecognitionFixture::Passthrough`]: `Identity` over a
//!   dynamic input, so the output is a rank-4 tensor.

use std::path::Path;

use super::models::{ModelPaths, ModelStage};

const TENSOR_FLOAT: u64 = 1;
const TENSOR_INT64: u64 = 7;
const ATTRIBUTE_INTS: u64 = 7;
const IR_VERSION: u64 = 8;
const OPSET_VERSION: u64 = 13;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Dim {
    Fixed(i64),
    Named(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum RecognitionFixture {
    Sequence,
    Passthrough,
}

/// Write all three fixture models into `dir` under their default names
pub(crate) fn write_models(dir: &Path, recognition: RecognitionFixture) -> ModelPaths {
    let paths = ModelPaths::from_dir(dir);
    let rec = match recognition {
        RecognitionFixture::Sequence => sequence_model(),
        RecognitionFixture::Passthrough => passthrough_model(),
    };
    let models = [
        (ModelStage::Detection, detection_model()),
        (ModelStage::Classification, classification_model()),
        (ModelStage::Recognition, rec),
    ];
    for (stage, bytes) in models {
        std::fs::write(paths.path(stage), bytes).unwrap();
    }
    paths
}

/// BGRA buffer from (r, g, b) pixels
pub(crate) fn bgra(pixels: &[(u8, u8, u8)]) -> Vec<u8> {
    pixels
        .iter()
        .flat_map(|&(r, g, b)| [b, g, r, 255])
        .collect()
}

pub(crate) fn detection_model() -> Vec<u8> {
    let input = [Dim::Fixed(1), Dim::Fixed(3), Dim::Fixed(3), Dim::Fixed(3)];
    let output = [Dim::Fixed(1), Dim::Fixed(3), Dim::Fixed(9)];
    reshape_model(&input, &[1, 3, 9], &output)
}

pub(crate) fn classification_model() -> Vec<u8> {
    let input = [Dim::Fixed(1), Dim::Fixed(3), Dim::Fixed(1), Dim::Fixed(1)];
    let output = [Dim::Fixed(1), Dim::Fixed(3)];
    reshape_model(&input, &[1, 3], &output)
}

pub(crate) fn sequence_model() -> Vec<u8> {
    let input = [Dim::Fixed(1), Dim::Fixed(3), Dim::Fixed(1), Dim::Named("W")];
    let output = [Dim::Fixed(1), Dim::Named("W"), Dim::Fixed(3)];
    let nodes = [
        node("Reshape", &["x", "shape"], &["planes"], &[]),
        node("Transpose", &["planes"], &["y"], &[ints_attribute("perm", &[0, 2, 1])]),
    ];
    model(&graph(
        &nodes,
        &[int64_tensor("shape", &[1, 3, -1])],
        &value_info("x", &input),
        &value_info("y", &output),
    ))
}

pub(crate) fn passthrough_model() -> Vec<u8> {
    let dims = [Dim::Named("N"), Dim::Fixed(3), Dim::Named("H"), Dim::Named("W")];
    model(&graph(
        &[node("Identity", &["x"], &["y"], &[])],
        &[],
        &value_info("x", &dims),
        &value_info("y", &dims),
    ))
}

fn reshape_model(input: &[Dim], target: &[i64], output: &[Dim]) -> Vec<u8> {
    model(&graph(
        &[node("Reshape", &["x", "shape"], &["y"], &[])],
        &[int64_tensor("shape", target)],
        &value_info("x", input),
        &value_info("y", output),
    ))
}

// protobuf wire format

fn varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn uint_field(buf: &mut Vec<u8>, field: u64, value: u64) {
    varint(buf, field << 3);
    varint(buf, value);
}

fn bytes_field(buf: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    varint(buf, (field << 3) | 2);
    varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn str_field(buf: &mut Vec<u8>, field: u64, value: &str) {
    bytes_field(buf, field, value.as_bytes());
}

// onnx.proto messages

fn model(graph: &[u8]) -> Vec<u8> {
    let mut opset = Vec::new();
    uint_field(&mut opset, 2, OPSET_VERSION);

    let mut buf = Vec::new();
    uint_field(&mut buf, 1, IR_VERSION);
    str_field(&mut buf, 2, "water-meter-ocr-tests");
    bytes_field(&mut buf, 7, graph);
    bytes_field(&mut buf, 8, &opset);
    buf
}

fn graph(nodes: &[Vec<u8>], initializers: &[Vec<u8>], input: &[u8], output: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    for n in nodes {
        bytes_field(&mut buf, 1, n);
    }
    str_field(&mut buf, 2, "fixture");
    for init in initializers {
        bytes_field(&mut buf, 5, init);
    }
    bytes_field(&mut buf, 11, input);
    bytes_field(&mut buf, 12, output);
    buf
}

fn node(op_type: &str, inputs: &[&str], outputs: &[&str], attributes: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    for name in inputs {
        str_field(&mut buf, 1, name);
    }
    for name in outputs {
        str_field(&mut buf, 2, name);
    }
    str_field(&mut buf, 4, op_type);
    for attr in attributes {
        bytes_field(&mut buf, 5, attr);
    }
    buf
}

fn ints_attribute(name: &str, values: &[i64]) -> Vec<u8> {
    let mut buf = Vec::new();
    str_field(&mut buf, 1, name);
    for &v in values {
        uint_field(&mut buf, 8, v as u64);
    }
    uint_field(&mut buf, 20, ATTRIBUTE_INTS);
    buf
}

fn int64_tensor(name: &str, values: &[i64]) -> Vec<u8> {
    let mut buf = Vec::new();
    uint_field(&mut buf, 1, values.len() as u64);
    uint_field(&mut buf, 2, TENSOR_INT64);
    for &v in values {
        uint_field(&mut buf, 7, v as u64);
    }
    str_field(&mut buf, 8, name);
    buf
}

fn value_info(name: &str, dims: &[Dim]) -> Vec<u8> {
    let mut shape = Vec::new();
    for dim in dims {
        let mut d = Vec::new();
        match *dim {
            Dim::Fixed(v) => uint_field(&mut d, 1, v as u64),
            Dim::Named(param) => str_field(&mut d, 2, param),
        }
        bytes_field(&mut shape, 1, &d);
    }

    let mut tensor = Vec::new();
    uint_field(&mut tensor, 1, TENSOR_FLOAT);
    bytes_field(&mut tensor, 2, &shape);

    let mut ty = Vec::new();
    bytes_field(&mut ty, 1, &tensor);

    let mut buf = Vec::new();
    str_field(&mut buf, 1, name);
    bytes_field(&mut buf, 2, &ty);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_encoding() {
        let mut buf = Vec::new();
        varint(&mut buf, 300);
        assert_eq!(buf, vec![0xAC, 0x02]);

        buf.clear();
        varint(&mut buf, -1i64 as u64);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_model_header() {
        let bytes = detection_model();
        // ir_version = 8 comes first
        assert_eq!(&bytes[..2], &[0x08, 0x08]);
    }
}
