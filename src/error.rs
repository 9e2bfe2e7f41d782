// src/error.rs
//! Fail-fast errors raised by the detection engine.
//!
//! These describe programming or configuration mistakes (bad thresholds,
//! signatures from different hash families, illegal status transitions).
//! Data problems such as empty text never surface here; they degrade to a
//! low similarity instead.

use thiserror::Error;
use uuid::Uuid;

use crate::models::candidates::DuplicateStatus;
use crate::models::core::EntityType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Signatures are not comparable: lengths {left} and {right}")]
    SignatureMismatch { left: usize, right: usize },

    #[error("Invalid similarity thresholds: {0}")]
    InvalidThresholds(String),

    #[error("Invalid field weights: {0}")]
    InvalidWeights(String),

    #[error("Unknown threshold preset '{0}'")]
    UnknownPreset(String),

    #[error("Unknown entity type '{0}'")]
    UnknownEntityType(String),

    #[error("No duplicate detector exists for entity type '{0}'")]
    NoDetector(EntityType),

    #[error("Signature bytes have invalid length {0} (must be a non-zero multiple of 8)")]
    InvalidSignatureBytes(usize),

    #[error("Illegal status transition {from} -> {to}")]
    InvalidTransition {
        from: DuplicateStatus,
        to: DuplicateStatus,
    },

    #[error("Duplicate candidate record {0} not found")]
    CandidateNotFound(Uuid),

    #[error("Unknown {kind} value '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("Configuration error: {0}")]
    Config(String),
}
