// src/lsh/composite.rs
//! Combines several weighted text fields into one shingle set.
//!
//! Each field's shingles are added `max(1, round(weight * 10))` times, every
//! copy tagged with its copy index so the copies stay distinct set members.
//! Heavily weighted fields therefore own more of the union and win more of
//! the per-hash minimums.
//!
//! This is a multiplicity approximation, not an exact weighted-Jaccard
//! estimator: weights are quantised to tenths, and a field's influence also
//! grows with its length. Treat scores from weighted inputs as a ranking
//! signal. A proper weighted MinHash (e.g. consistent weighted sampling)
//! would be needed for calibrated weighted similarity.

use crate::error::DetectionError;
use crate::lsh::shingle::{shingle, ShingleSet};

const COPY_TAG_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeInput {
    fields: Vec<String>,
    weights: Vec<f64>,
}

impl CompositeInput {
    /// Builds an input from ordered fields and optional parallel weights.
    /// Without weights every field gets `1 / n`.
    pub fn new(fields: Vec<String>, weights: Option<&[f64]>) -> Result<Self, DetectionError> {
        let weights = match weights {
            Some(weights) => {
                if weights.len() != fields.len() {
                    return Err(DetectionError::InvalidWeights(format!(
                        "{} weights for {} fields",
                        weights.len(),
                        fields.len()
                    )));
                }
                if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                    return Err(DetectionError::InvalidWeights(format!(
                        "weights must be finite and non-negative: {:?}",
                        weights
                    )));
                }
                weights.to_vec()
            }
            None if fields.is_empty() => Vec::new(),
            None => vec![1.0 / fields.len() as f64; fields.len()],
        };

        Ok(Self { fields, weights })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// How many tagged copies of a field's shingles enter the union.
    pub fn repetitions(weight: f64) -> usize {
        ((weight * 10.0).round() as usize).max(1)
    }

    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.trim().is_empty())
    }

    /// The combined, copy-tagged shingle set.
    pub fn shingles(&self, k: usize) -> ShingleSet {
        let mut combined = ShingleSet::new();
        for (field, weight) in self.fields.iter().zip(self.weights.iter()) {
            let field_shingles = shingle(field, k);
            if field_shingles.is_empty() {
                continue;
            }
            for copy in 0..Self::repetitions(*weight) {
                for s in &field_shingles {
                    combined.insert(format!("{}{}{}", copy, COPY_TAG_SEPARATOR, s));
                }
            }
        }
        combined
    }
}
