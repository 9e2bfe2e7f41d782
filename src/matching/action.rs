// src/matching/action.rs
use chrono::{DateTime, Utc};

use crate::error::DetectionError;
use crate::lsh::{Signature, SignatureEngine};
use crate::matching::detector::{signature_profile, signature_score, DuplicateDetector, PairScore};
use crate::models::core::{ActionFields, EntityType};
use crate::severity::SimilarityThresholds;

pub const DEFAULT_BUCKET_MINUTES: u32 = 5;

const ACTION_WEIGHTS: [f64; 3] = [0.6, 0.3, 0.1];

/// Action logs: title, time bucket and description, relaxed thresholds.
#[derive(Debug, Clone)]
pub struct ActionDetector {
    thresholds: SimilarityThresholds,
    bucket_minutes: u32,
}

impl ActionDetector {
    pub fn new(thresholds: SimilarityThresholds, bucket_minutes: u32) -> Self {
        Self {
            thresholds,
            bucket_minutes: bucket_minutes.max(1),
        }
    }

    /// Floors `log_time` to the start of its bucket, formatted to the minute.
    pub fn time_bucket(&self, log_time: DateTime<Utc>) -> String {
        let width = i64::from(self.bucket_minutes) * 60;
        let seconds = log_time.timestamp();
        let floored = seconds - seconds.rem_euclid(width);
        DateTime::<Utc>::from_timestamp(floored, 0)
            .unwrap_or(log_time)
            .format("%Y-%m-%dT%H:%M")
            .to_string()
    }
}

impl Default for ActionDetector {
    fn default() -> Self {
        Self::new(SimilarityThresholds::RELAXED, DEFAULT_BUCKET_MINUTES)
    }
}

impl DuplicateDetector for ActionDetector {
    type Fields = ActionFields;
    type Profile = Signature;

    fn entity_type(&self) -> EntityType {
        EntityType::Action
    }

    fn thresholds(&self) -> &SimilarityThresholds {
        &self.thresholds
    }

    fn semantic_content(&self, fields: &ActionFields) -> Vec<String> {
        vec![
            fields.title.clone(),
            self.time_bucket(fields.log_time),
            fields.description.clone().unwrap_or_default(),
        ]
    }

    fn field_weights(&self) -> Option<&[f64]> {
        Some(&ACTION_WEIGHTS)
    }

    fn profile(&self, engine: &SignatureEngine, fields: &ActionFields) -> Result<Signature, DetectionError> {
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
    use chrono::TimeZone;
    use uuid::Uuid;

    fn action(title: &str, hour: u32, minute: u32, description: Option<&str>) -> ActionFields {
        ActionFields {
            title: title.to_string(),
            description: description.map(str::to_string),
            log_time: Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_time_is_bucketed_to_five_minutes() {
        let detector = ActionDetector::default();
        let at = |m| Utc.with_ymd_and_hms(2024, 5, 1, 7, m, 31).unwrap();
        assert_eq!(detector.time_bucket(at(2)), "2024-05-01T07:00");
        assert_eq!(detector.time_bucket(at(4)), "2024-05-01T07:00");
        assert_eq!(detector.time_bucket(at(5)), "2024-05-01T07:05");
        assert_eq!(detector.time_bucket(at(59)), "2024-05-01T07:55");
    }

    #[test]
    fn test_near_simultaneous_morning_runs_are_flagged() {
        let engine = SignatureEngine::default();
        let detector = ActionDetector::default();
        let existing = Stored::new(Uuid::new_v4(), action("Morning run", 7, 2, None));

        let found = detector
            .check_before_save(&engine, &action("Morning Run", 7, 4, None), &[existing.clone()])
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_id, existing.id);
        assert!(matches!(found[0].severity, Severity::High | Severity::Exact));
        assert!(found[0].similarity >= SimilarityThresholds::RELAXED.high());
    }

    #[test]
    fn test_unrelated_actions_are_not_reported() {
        let engine = SignatureEngine::default();
        let detector = ActionDetector::default();
        let pool = vec![Stored::new(
            Uuid::new_v4(),
            action("Meditation", 21, 30, Some("Guided breathing")),
        )];

        let found = detector
            .check_before_save(&engine, &action("Grocery shopping", 10, 0, Some("Weekly list")), &pool)
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_content_follows_field_order() {
        let detector = ActionDetector::default();
        let content = detector.semantic_content(&action("Stretch", 6, 58, Some("Hamstrings")));
        assert_eq!(content, vec!["Stretch", "2024-05-01T06:55", "Hamstrings"]);
        assert_eq!(detector.field_weights(), Some(&ACTION_WEIGHTS[..]));
    }
}
