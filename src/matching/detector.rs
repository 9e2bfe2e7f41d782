// src/matching/detector.rs
//! The per-kind duplicate detector abstraction.
//!
//! A detector turns an entity's fields into a comparable `Profile` once, then
//! scores profile pairs. MinHash-backed detectors use a [`Signature`] as their
//! profile and share the helpers at the bottom of this module; the term and
//! goal detectors carry their own field-based profiles and scoring.

use rayon::prelude::*;
use std::cmp::Ordering;
use uuid::Uuid;

use crate::error::DetectionError;
use crate::lsh::{CompositeInput, Signature, SignatureEngine};
use crate::matching::action::ActionDetector;
use crate::matching::goal::GoalDetector;
use crate::matching::goal_term::GoalTermDetector;
use crate::matching::measure::MeasureDetector;
use crate::matching::personal_value::PersonalValueDetector;
use crate::models::candidates::{DetectedPair, DuplicateCandidate, Severity};
use crate::models::core::{EntityType, Stored};
use crate::severity::{classify, SimilarityThresholds};
use crate::utils::config::DetectionConfig;

/// Score of one compared pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairScore {
    pub similarity: f64,
    pub severity: Severity,
    pub message: String,
}

impl PairScore {
    pub fn none() -> Self {
        Self {
            similarity: 0.0,
            severity: Severity::None,
            message: String::new(),
        }
    }
}

pub trait DuplicateDetector: Send + Sync {
    type Fields: Send + Sync;
    type Profile: Send + Sync;

    fn entity_type(&self) -> EntityType;

    fn thresholds(&self) -> &SimilarityThresholds;

    /// Ordered text fields that describe the entity.
    fn semantic_content(&self, fields: &Self::Fields) -> Vec<String>;

    /// Weights parallel to `semantic_content`; `None` means equal weights.
    fn field_weights(&self) -> Option<&[f64]> {
        None
    }

    fn composite_input(&self, fields: &Self::Fields) -> Result<CompositeInput, DetectionError> {
        CompositeInput::new(self.semantic_content(fields), self.field_weights())
    }

    fn profile(&self, engine: &SignatureEngine, fields: &Self::Fields) -> Result<Self::Profile, DetectionError>;

    fn score(
        &self,
        engine: &SignatureEngine,
        a: &Self::Profile,
        b: &Self::Profile,
    ) -> Result<PairScore, DetectionError>;

    /// Compares `target` against every pool member except itself and returns
    /// the reportable matches, most similar first.
    fn find_duplicates(
        &self,
        engine: &SignatureEngine,
        target: &Self::Fields,
        target_id: Option<Uuid>,
        pool: &[Stored<Self::Fields>],
    ) -> Result<Vec<DuplicateCandidate>, DetectionError> {
        let target_profile = self.profile(engine, target)?;
        let mut candidates = Vec::new();

        for existing in pool {
            if Some(existing.id) == target_id {
                continue;
            }
            let existing_profile = self.profile(engine, &existing.fields)?;
            let score = self.score(engine, &target_profile, &existing_profile)?;
            if score.severity.is_reportable() {
                candidates.push(DuplicateCandidate {
                    entity_id: existing.id,
                    similarity: score.similarity,
                    severity: score.severity,
                    message: score.message,
                });
            }
        }

        sort_by_similarity(&mut candidates);
        Ok(candidates)
    }

    /// Pre-save check of field values that have no id yet.
    fn check_before_save(
        &self,
        engine: &SignatureEngine,
        fields: &Self::Fields,
        pool: &[Stored<Self::Fields>],
    ) -> Result<Vec<DuplicateCandidate>, DetectionError> {
        self.find_duplicates(engine, fields, None, pool)
    }

    /// Scores every pair `(i, j)` with `i < j` and keeps the reportable ones,
    /// in iteration order. Rows of the outer loop are scored in parallel.
    fn scan_profiles(
        &self,
        engine: &SignatureEngine,
        profiles: &[(Uuid, Self::Profile)],
    ) -> Result<Vec<DetectedPair>, DetectionError> {
        let entity_type = self.entity_type();
        let rows: Vec<Result<Vec<DetectedPair>, DetectionError>> = (0..profiles.len())
            .into_par_iter()
            .map(|i| {
                let (id_a, a) = &profiles[i];
                let mut found = Vec::new();
                for (id_b, b) in &profiles[i + 1..] {
                    if id_a == id_b {
                        continue;
                    }
                    let score = self.score(engine, a, b)?;
                    if score.severity.is_reportable() {
                        found.push(DetectedPair {
                            entity_type,
                            entity1_id: *id_a,
                            entity2_id: *id_b,
                            similarity: score.similarity,
                            severity: score.severity,
                            message: score.message,
                        });
                    }
                }
                Ok(found)
            })
            .collect();

        let mut pairs = Vec::new();
        for row in rows {
            pairs.extend(row?);
        }
        Ok(pairs)
    }
}

pub fn sort_by_similarity(candidates: &mut [DuplicateCandidate]) {
    candidates.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
}

/// Number of `i < j` pairs among `n` entities.
pub fn pair_count(n: usize) -> usize {
    n.saturating_sub(1) * n / 2
}

// ---- MinHash-backed helpers ----

pub fn signature_profile<D>(detector: &D, engine: &SignatureEngine, fields: &D::Fields) -> Result<Signature, DetectionError>
where
    D: DuplicateDetector + ?Sized,
{
    let input = detector.composite_input(fields)?;
    Ok(engine.composite_signature(&input))
}

pub fn signature_score(
    engine: &SignatureEngine,
    entity_type: EntityType,
    thresholds: &SimilarityThresholds,
    a: &Signature,
    b: &Signature,
) -> Result<PairScore, DetectionError> {
    let similarity = engine.compare(a, b)?;
    let severity = classify(similarity, thresholds);
    let message = describe_match(entity_type, similarity, severity);
    Ok(PairScore {
        similarity,
        severity,
        message,
    })
}

pub fn describe_match(entity_type: EntityType, similarity: f64, severity: Severity) -> String {
    match severity {
        Severity::Exact => format!("Exact duplicate {} already exists", entity_type.label()),
        Severity::None => String::new(),
        _ => format!(
            "Similar {} found ({:.0}% match, {} severity)",
            entity_type.label(),
            similarity * 100.0,
            severity
        ),
    }
}

// ---- Closed set of detectors ----

/// One detector per detectable kind, built once from configuration.
#[derive(Debug, Clone)]
pub struct DetectorSet {
    pub action: ActionDetector,
    pub measure: MeasureDetector,
    pub personal_value: PersonalValueDetector,
    pub goal_term: GoalTermDetector,
    pub goal: GoalDetector,
}

/// A borrowed detector selected by entity kind.
#[derive(Debug, Clone, Copy)]
pub enum Detector<'a> {
    Action(&'a ActionDetector),
    Measure(&'a MeasureDetector),
    PersonalValue(&'a PersonalValueDetector),
    GoalTerm(&'a GoalTermDetector),
    Goal(&'a GoalDetector),
}

impl<'a> Detector<'a> {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Detector::Action(d) => d.entity_type(),
            Detector::Measure(d) => d.entity_type(),
            Detector::PersonalValue(d) => d.entity_type(),
            Detector::GoalTerm(d) => d.entity_type(),
            Detector::Goal(d) => d.entity_type(),
        }
    }

    pub fn thresholds(&self) -> &'a SimilarityThresholds {
        match *self {
            Detector::Action(d) => d.thresholds(),
            Detector::Measure(d) => d.thresholds(),
            Detector::PersonalValue(d) => d.thresholds(),
            Detector::GoalTerm(d) => d.thresholds(),
            Detector::Goal(d) => d.thresholds(),
        }
    }

    /// Whether the detector compares MinHash signatures (and can use the
    /// signature cache).
    pub fn uses_signatures(&self) -> bool {
        matches!(
            self,
            Detector::Action(_) | Detector::Measure(_) | Detector::PersonalValue(_)
        )
    }
}

impl DetectorSet {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            action: ActionDetector::new(
                config.thresholds_for(EntityType::Action),
                config.action_bucket_minutes,
            ),
            measure: MeasureDetector::new(config.thresholds_for(EntityType::Measure)),
            personal_value: PersonalValueDetector::new(config.thresholds_for(EntityType::PersonalValue)),
            goal_term: GoalTermDetector::new(config.thresholds_for(EntityType::GoalTerm)),
            goal: GoalDetector::new(config.thresholds_for(EntityType::Goal)),
        }
    }

    pub fn get(&self, entity_type: EntityType) -> Result<Detector<'_>, DetectionError> {
        match entity_type {
            EntityType::Action => Ok(Detector::Action(&self.action)),
            EntityType::Measure => Ok(Detector::Measure(&self.measure)),
            EntityType::PersonalValue => Ok(Detector::PersonalValue(&self.personal_value)),
            EntityType::GoalTerm => Ok(Detector::GoalTerm(&self.goal_term)),
            EntityType::Goal => Ok(Detector::Goal(&self.goal)),
            other => Err(DetectionError::NoDetector(other)),
        }
    }
}

impl Default for DetectorSet {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::MeasureFields;

    fn measure(unit: &str, unit_type: &str) -> MeasureFields {
        MeasureFields {
            unit: unit.to_string(),
            unit_type: unit_type.to_string(),
        }
    }

    #[test]
    fn test_every_scan_kind_has_a_detector() {
        let detectors = DetectorSet::default();
        for kind in EntityType::SCAN_ORDER {
            let detector = detectors.get(kind).unwrap();
            assert_eq!(detector.entity_type(), kind);
        }
        assert!(detectors.get(EntityType::Measure).unwrap().uses_signatures());
        assert!(!detectors.get(EntityType::GoalTerm).unwrap().uses_signatures());
        assert!(!detectors.get(EntityType::Goal).unwrap().uses_signatures());
    }

    #[test]
    fn test_kinds_without_detector_fail_fast() {
        let detectors = DetectorSet::default();
        for kind in [
            EntityType::Expectation,
            EntityType::TimePeriod,
            EntityType::Milestone,
            EntityType::Obligation,
        ] {
            assert_eq!(detectors.get(kind).unwrap_err(), DetectionError::NoDetector(kind));
        }
    }

    #[test]
    fn test_find_duplicates_skips_self_and_sorts() {
        let engine = SignatureEngine::default();
        let detectors = DetectorSet::default();
        let me = Uuid::new_v4();
        let pool = vec![
            Stored::new(me, measure("kg", "mass")),
            Stored::new(Uuid::new_v4(), measure("km", "distance")),
            Stored::new(Uuid::new_v4(), measure("kg", "mass")),
        ];

        let found = detectors
            .measure
            .find_duplicates(&engine, &measure("kg", "mass"), Some(me), &pool)
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_id, pool[2].id);
        assert_eq!(found[0].severity, Severity::Exact);
        assert!(found.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_scan_profiles_visits_each_pair_once() {
        let engine = SignatureEngine::default();
        let detector = DetectorSet::default().measure;
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let profiles: Vec<(Uuid, Signature)> = ids
            .iter()
            .map(|id| (*id, detector.profile(&engine, &measure("hours", "time")).unwrap()))
            .collect();

        let pairs = detector.scan_profiles(&engine, &profiles).unwrap();
        assert_eq!(pairs.len(), pair_count(3));
        assert!(pairs.iter().all(|p| p.entity1_id != p.entity2_id));
        assert_eq!((pairs[0].entity1_id, pairs[0].entity2_id), (ids[0], ids[1]));
    }

    #[test]
    fn test_pair_count() {
        assert_eq!(pair_count(0), 0);
        assert_eq!(pair_count(1), 0);
        assert_eq!(pair_count(4), 6);
    }
}
