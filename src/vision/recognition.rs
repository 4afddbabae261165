//! Text recognition output decoding
//!
//! The recognition model outputs a probability distribution over the
//! vocabulary at each timestep. Greedy CTC decoding picks the best symbol
//! per step, collapses consecutive repeats and drops the blank.

use anyhow::{Context, Result};
use ndarray::{ArrayD, ArrayView2, Axis, Ix2, Ix3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{OcrError, OcrResult};

/// Index reserved for the CTC blank symbol
pub const BLANK_INDEX: usize = 0;

/// Symbol table for the recognition model
///
/// Index 0 is always the blank; dictionary entries follow in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    symbols: Vec<String>,
}

impl Vocabulary {
    /// Built-in table for digit-only meter models: blank, then '0'..='9'
    pub fn digits() -> Self {
        Self::from_symbols(('0'..='9').map(|c| c.to_string()))
    }

    /// Build a vocabulary from dictionary entries (blank is prepended)
    pub fn from_symbols<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut symbols = vec![String::new()];
        symbols.extend(entries.into_iter().map(Into::into));
        Self { symbols }
    }

    /// Load a PaddleOCR dictionary file, one symbol per line
    ///
    /// A trailing space symbol is appended when the file does not list one,
    /// matching how PaddleOCR exports with `use_space_char`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dictionary: {}", path.display()))?;

        let entries: Vec<String> = content
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if entries.is_empty() {
            anyhow::bail!("Dictionary {} contains no symbols", path.display());
        }

        let mut vocabulary = Self::from_symbols(entries);
        if !vocabulary.symbols[1..].iter().any(|s| s == " ") {
            vocabulary.symbols.push(" ".to_string());
        }

        debug!("Loaded dictionary with {} symbols", vocabulary.len());
        Ok(vocabulary)
    }

    /// Number of classes including the blank
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.len() <= 1
    }

    pub fn symbol(&self, index: usize) -> Option<&str> {
        self.symbols.get(index).map(String::as_str)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::digits()
    }
}

/// Decoded recognition result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    /// Mean probability of the emitted symbols (0.0 when nothing was emitted)
    pub confidence: f32,
}

/// Greedy CTC decoder over a fixed vocabulary
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    vocabulary: Vocabulary,
}

impl CtcDecoder {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Decode the raw recognition output
    ///
    /// Accepts (1, T, C) or (T, C) probabilities, or a flat (T) sequence of
    /// symbol indices.
    pub fn decode(&self, output: &ArrayD<f32>) -> OcrResult<Recognition> {
        match output.ndim() {
            3 => {
                let probs = output
                    .view()
                    .into_dimensionality::<Ix3>()
                    .map_err(|e| OcrError::decode(e.to_string()))?;
                if probs.shape()[0] == 0 {
                    return Err(OcrError::decode("recognition output has an empty batch"));
                }
                self.decode_probabilities(probs.index_axis(Axis(0), 0))
            }
            2 => {
                let probs = output
                    .view()
                    .into_dimensionality::<Ix2>()
                    .map_err(|e| OcrError::decode(e.to_string()))?;
                self.decode_probabilities(probs)
            }
            1 => {
                let indices = output
                    .iter()
                    .map(|&v| {
                        if v < 0.0 || v.fract() != 0.0 {
                            Err(OcrError::decode(format!("invalid symbol index {v}")))
                        } else {
                            Ok(v as usize)
                        }
                    })
                    .collect::<OcrResult<Vec<usize>>>()?;
                let text = self.decode_indices(&indices)?;
                let confidence = if text.is_empty() { 0.0 } else { 1.0 };
                Ok(Recognition { text, confidence })
            }
            _ => Err(OcrError::decode(format!(
                "recognition output must be [1, T, C], [T, C] or [T], got {:?}",
                output.shape()
            ))),
        }
    }

    /// Collapse repeats, drop blanks and map indices to symbols
    pub fn decode_indices(&self, indices: &[usize]) -> OcrResult<String> {
        let mut text = String::new();
        let mut prev = None;

        for &index in indices {
            if index != BLANK_INDEX && prev != Some(index) {
                text.push_str(self.lookup(index)?);
            }
            prev = Some(index);
        }

        Ok(text)
    }

    /// Greedy decode of a (T, C) probability matrix
    fn decode_probabilities(&self, probs: ArrayView2<'_, f32>) -> OcrResult<Recognition> {
        let classes = probs.shape()[1];
        if classes == 0 {
            return Err(OcrError::decode("recognition output has no classes"));
        }
        if classes != self.vocabulary.len() {
            debug!(
                "Recognition output has {} classes, vocabulary has {}",
                classes,
                self.vocabulary.len()
            );
        }

        let mut text = String::new();
        let mut total = 0.0f32;
        let mut emitted = 0usize;
        let mut prev = None;

        for step in probs.rows() {
            let (index, prob) = step
                .iter()
                .copied()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

            if index != BLANK_INDEX && prev != Some(index) {
                text.push_str(self.lookup(index)?);
                total += prob;
                emitted += 1;
            }
            prev = Some(index);
        }

        let confidence = if emitted == 0 { 0.0 } else { total / emitted as f32 };
        Ok(Recognition { text, confidence })
    }

    fn lookup(&self, index: usize) -> OcrResult<&str> {
        self.vocabulary.symbol(index).ok_or_else(|| {
            OcrError::decode(format!(
                "symbol index {} outside vocabulary of {}",
                index,
                self.vocabulary.len()
            ))
        })
    }
}
