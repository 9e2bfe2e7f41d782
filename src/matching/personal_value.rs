// src/matching/personal_value.rs
use log::warn;

use crate::error::DetectionError;
use crate::lsh::{Signature, SignatureEngine};
use crate::matching::detector::{signature_profile, signature_score, DuplicateDetector, PairScore};
use crate::models::core::{EntityType, PersonalValueFields};
use crate::severity::SimilarityThresholds;

/// Tier tags a personal value can carry.
pub const VALUE_LEVELS: [&str; 4] = ["general", "major", "highest_order", "life_area"];

pub fn is_known_value_level(level: &str) -> bool {
    let level = level.trim().to_lowercase();
    VALUE_LEVELS.contains(&level.as_str())
}

#[derive(Debug, Clone)]
pub struct PersonalValueDetector {
    thresholds: SimilarityThresholds,
}

impl PersonalValueDetector {
    pub fn new(thresholds: SimilarityThresholds) -> Self {
        Self { thresholds }
    }
}

impl Default for PersonalValueDetector {
    fn default() -> Self {
        Self::new(SimilarityThresholds::DEFAULT)
    }
}

impl DuplicateDetector for PersonalValueDetector {
    type Fields = PersonalValueFields;
    type Profile = Signature;

    fn entity_type(&self) -> EntityType {
        EntityType::PersonalValue
    }

    fn thresholds(&self) -> &SimilarityThresholds {
        &self.thresholds
    }

    fn semantic_content(&self, fields: &PersonalValueFields) -> Vec<String> {
        vec![
            fields.title.clone(),
            fields.value_level.clone(),
            fields.life_domain.clone().unwrap_or_default(),
        ]
    }

    /// Unknown tier tags are still compared as text, with a warning.
    fn profile(&self, engine: &SignatureEngine, fields: &PersonalValueFields) -> Result<Signature, DetectionError> {
        if !is_known_value_level(&fields.value_level) {
            warn!(
                "Personal value '{}' has unknown level '{}' (expected one of {:?})",
                fields.title, fields.value_level, VALUE_LEVELS
            );
        }
        signature_profile(self, engine, fields)
    }

    fn score(&self, engine: &SignatureEngine, a: &Signature, b: &Signature) -> Result<PairScore, DetectionError> {
        signature_score(engine, self.entity_type(), &self.thresholds, a, b)
    }
}
