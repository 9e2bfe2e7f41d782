// src/matching/goal_term.rs
//! Planning terms. Term numbers are unique, so a shared number is always an
//! exact duplicate whatever the themes say. Differing numbers only surface a
//! reduced-confidence match when the themes read alike.

use crate::error::DetectionError;
use crate::lsh::SignatureEngine;
use crate::matching::detector::{DuplicateDetector, PairScore};
use crate::matching::text::text_similarity;
use crate::models::candidates::Severity;
use crate::models::core::{EntityType, GoalTermFields};
use crate::severity::SimilarityThresholds;

pub const THEME_MATCH_THRESHOLD: f64 = 0.8;
pub const THEME_MATCH_DISCOUNT: f64 = 0.5;

const TERM_WEIGHTS: [f64; 2] = [0.8, 0.2];

#[derive(Debug, Clone)]
pub struct GoalTermDetector {
    thresholds: SimilarityThresholds,
}

impl GoalTermDetector {
    pub fn new(thresholds: SimilarityThresholds) -> Self {
        Self { thresholds }
    }
}

impl Default for GoalTermDetector {
    fn default() -> Self {
        Self::new(SimilarityThresholds::DEFAULT)
    }
}

impl DuplicateDetector for GoalTermDetector {
    type Fields = GoalTermFields;
    type Profile = GoalTermFields;

    fn entity_type(&self) -> EntityType {
        EntityType::GoalTerm
    }

    fn thresholds(&self) -> &SimilarityThresholds {
        &self.thresholds
    }

    fn semantic_content(&self, fields: &GoalTermFields) -> Vec<String> {
        vec![fields.term_number.to_string(), fields.theme.clone().unwrap_or_default()]
    }

    fn field_weights(&self) -> Option<&[f64]> {
        Some(&TERM_WEIGHTS)
    }

    fn profile(&self, _engine: &SignatureEngine, fields: &GoalTermFields) -> Result<GoalTermFields, DetectionError> {
        Ok(fields.clone())
    }

    fn score(
        &self,
        _engine: &SignatureEngine,
        a: &GoalTermFields,
        b: &GoalTermFields,
    ) -> Result<PairScore, DetectionError> {
        if a.term_number == b.term_number {
            return Ok(PairScore {
                similarity: 1.0,
                severity: Severity::Exact,
                message: format!("Term {} already exists", a.term_number),
            });
        }

        let theme_similarity = match (a.theme.as_deref(), b.theme.as_deref()) {
            (Some(left), Some(right)) => text_similarity(left, right),
            _ => 0.0,
        };

        if theme_similarity >= THEME_MATCH_THRESHOLD {
            return Ok(PairScore {
                similarity: theme_similarity * THEME_MATCH_DISCOUNT,
                severity: Severity::Low,
                message: format!(
                    "Terms {} and {} have similar themes ({:.0}% match)",
                    a.term_number,
                    b.term_number,
                    theme_similarity * 100.0
                ),
            });
        }

        Ok(PairScore::none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(number: i32, theme: Option<&str>) -> GoalTermFields {
        GoalTermFields {
            term_number: number,
            theme: theme.map(str::to_string),
        }
    }

    fn score(a: &GoalTermFields, b: &GoalTermFields) -> PairScore {
        GoalTermDetector::default()
            .score(&SignatureEngine::default(), a, b)
            .unwrap()
    }

    #[test]
    fn test_same_number_is_exact_regardless_of_theme() {
        let result = score(&term(3, Some("Health focus")), &term(3, Some("Career growth")));
        assert_eq!(result.severity, Severity::Exact);
        assert_eq!(result.similarity, 1.0);

        let result = score(&term(3, None), &term(3, Some("Anything")));
        assert_eq!(result.severity, Severity::Exact);
    }

    #[test]
    fn test_identical_themes_on_different_numbers_stay_low() {
        let result = score(&term(1, Some("Health focus")), &term(2, Some("Health focus")));
        assert_eq!(result.severity, Severity::Low);
        assert_eq!(result.similarity, 0.5);
    }

    #[test]
    fn test_dissimilar_themes_are_not_reported() {
        let result = score(&term(1, Some("Health focus")), &term(2, Some("Learn Spanish")));
        assert_eq!(result.severity, Severity::None);

        let result = score(&term(1, None), &term(2, None));
        assert_eq!(result.severity, Severity::None);
    }
}
