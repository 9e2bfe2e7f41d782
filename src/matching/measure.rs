// src/matching/measure.rs
use crate::error::DetectionError;
use crate::lsh::{Signature, SignatureEngine};
use crate::matching::detector::{signature_profile, signature_score, DuplicateDetector, PairScore};
use crate::models::core::{EntityType, MeasureFields};
use crate::severity::SimilarityThresholds;

/// Measurement units from the catalog. Strict thresholds.
#[derive(Debug, Clone)]
pub struct MeasureDetector {
    thresholds: SimilarityThresholds,
}

impl MeasureDetector {
    pub fn new(thresholds: SimilarityThresholds) -> Self {
        Self { thresholds }
    }
}

impl Default for MeasureDetector {
    fn default() -> Self {
        Self::new(SimilarityThresholds::STRICT)
    }
}

impl DuplicateDetector for MeasureDetector {
    type Fields = MeasureFields;
    type Profile = Signature;

    fn entity_type(&self) -> EntityType {
        EntityType::Measure
    }

    fn thresholds(&self) -> &SimilarityThresholds {
        &self.thresholds
    }

    fn semantic_content(&self, fields: &MeasureFields) -> Vec<String> {
        vec![fields.unit.clone(), fields.unit_type.clone()]
    }

    fn profile(&self, engine: &SignatureEngine, fields: &MeasureFields) -> Result<Signature, DetectionError> {
        signature_profile(self, engine, fields)
    }

    fn score(&self, engine: &SignatureEngine, a: &Signature, b: &Signature) -> Result<PairScore, DetectionError> {
        signature_score(engine, self.entity_type(), &self.thresholds, a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidates::Severity;
    use crate::models::core::Stored;
    use uuid::Uuid;

    fn unit(unit: &str, unit_type: &str) -> MeasureFields {
        MeasureFields {
            unit: unit.to_string(),
            unit_type: unit_type.to_string(),
        }
    }

    #[test]
    fn test_km_and_miles_are_distinct_units() {
        let engine = SignatureEngine::default();
        let detector = MeasureDetector::default();
        let km = detector.profile(&engine, &unit("km", "length")).unwrap();
        let miles = detector.profile(&engine, &unit("miles", "length")).unwrap();

        let score = detector.score(&engine, &km, &miles).unwrap();
        assert!(score.similarity < SimilarityThresholds::STRICT.low());
        assert_eq!(score.severity, Severity::None);

        let pool = vec![Stored::new(Uuid::new_v4(), unit("miles", "length"))];
        assert!(detector
            .check_before_save(&engine, &unit("km", "length"), &pool)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_same_unit_with_different_case_is_exact() {
        let engine = SignatureEngine::default();
        let detector = MeasureDetector::default();
        let pool = vec![Stored::new(Uuid::new_v4(), unit("Minutes", "Time"))];

        let found = detector
            .check_before_save(&engine, &unit("minutes", "time"), &pool)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Exact);
        assert_eq!(found[0].message, "Exact duplicate measure already exists");
    }

    #[test]
    fn test_blank_units_never_match() {
        let engine = SignatureEngine::default();
        let detector = MeasureDetector::default();
        let a = detector.profile(&engine, &unit("", "")).unwrap();
        let b = detector.profile(&engine, &unit(" ", "")).unwrap();
        assert_eq!(detector.score(&engine, &a, &b).unwrap().severity, Severity::None);
    }
}
