// src/severity.rs
//! Similarity thresholds and the tier classifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DetectionError;
use crate::models::candidates::Severity;
use crate::models::core::EntityType;

/// Absorbs floating-point accumulation in weighted scores when testing for
/// the `exact` tier. Anything further than this below `exact` is `high`.
pub const EXACT_TOLERANCE: f64 = 1e-9;

/// Four strictly ordered cut points: `exact > high > moderate > low`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityThresholds {
    exact: f64,
    high: f64,
    moderate: f64,
    low: f64,
}

impl SimilarityThresholds {
    /// Catalog-like entities such as measurement units.
    pub const STRICT: SimilarityThresholds = SimilarityThresholds {
        exact: 1.0,
        high: 0.95,
        moderate: 0.85,
        low: 0.70,
    };

    pub const DEFAULT: SimilarityThresholds = SimilarityThresholds {
        exact: 1.0,
        high: 0.85,
        moderate: 0.70,
        low: 0.50,
    };

    /// User-authored free text where repetition is expected.
    pub const RELAXED: SimilarityThresholds = SimilarityThresholds {
        exact: 1.0,
        high: 0.75,
        moderate: 0.60,
        low: 0.40,
    };

    pub const GOAL: SimilarityThresholds = SimilarityThresholds {
        exact: 1.0,
        high: 0.85,
        moderate: 0.70,
        low: 0.50,
    };

    pub fn new(exact: f64, high: f64, moderate: f64, low: f64) -> Result<Self, DetectionError> {
        let values = [exact, high, moderate, low];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > 1.0) {
            return Err(DetectionError::InvalidThresholds(format!(
                "all cut points must lie in [0, 1], got {:?}",
                values
            )));
        }
        if !(exact > high && high > moderate && moderate > low) {
            return Err(DetectionError::InvalidThresholds(format!(
                "cut points must be strictly decreasing (exact > high > moderate > low), got {:?}",
                values
            )));
        }
        Ok(Self {
            exact,
            high,
            moderate,
            low,
        })
    }

    pub fn exact(&self) -> f64 {
        self.exact
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn moderate(&self) -> f64 {
        self.moderate
    }

    pub fn low(&self) -> f64 {
        self.low
    }
}

impl Default for SimilarityThresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Named threshold sets selectable per entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPreset {
    Strict,
    Default,
    Relaxed,
    Goal,
}

impl ThresholdPreset {
    pub fn thresholds(&self) -> SimilarityThresholds {
        match self {
            ThresholdPreset::Strict => SimilarityThresholds::STRICT,
            ThresholdPreset::Default => SimilarityThresholds::DEFAULT,
            ThresholdPreset::Relaxed => SimilarityThresholds::RELAXED,
            ThresholdPreset::Goal => SimilarityThresholds::GOAL,
        }
    }

    /// The preset a kind uses when no override is configured.
    pub fn for_entity_type(entity_type: EntityType) -> ThresholdPreset {
        match entity_type {
            EntityType::Measure => ThresholdPreset::Strict,
            EntityType::Action => ThresholdPreset::Relaxed,
            EntityType::Goal => ThresholdPreset::Goal,
            _ => ThresholdPreset::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdPreset::Strict => "strict",
            ThresholdPreset::Default => "default",
            ThresholdPreset::Relaxed => "relaxed",
            ThresholdPreset::Goal => "goal",
        }
    }
}

impl fmt::Display for ThresholdPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdPreset {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(ThresholdPreset::Strict),
            "default" => Ok(ThresholdPreset::Default),
            "relaxed" => Ok(ThresholdPreset::Relaxed),
            "goal" => Ok(ThresholdPreset::Goal),
            _ => Err(DetectionError::UnknownPreset(s.to_string())),
        }
    }
}

/// Maps a similarity score onto its severity tier.
pub fn classify(similarity: f64, thresholds: &SimilarityThresholds) -> Severity {
    if similarity.is_nan() {
        return Severity::None;
    }
    if similarity >= thresholds.exact - EXACT_TOLERANCE {
        Severity::Exact
    } else if similarity >= thresholds.high {
        Severity::High
    } else if similarity >= thresholds.moderate {
        Severity::Moderate
    } else if similarity >= thresholds.low {
        Severity::Low
    } else {
        Severity::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_for_default_preset() {
        let t = SimilarityThresholds::DEFAULT;
        assert_eq!(classify(1.0, &t), Severity::Exact);
        assert_eq!(classify(0.99, &t), Severity::High);
        assert_eq!(classify(0.85, &t), Severity::High);
        assert_eq!(classify(0.849, &t), Severity::Moderate);
        assert_eq!(classify(0.70, &t), Severity::Moderate);
        assert_eq!(classify(0.50, &t), Severity::Low);
        assert_eq!(classify(0.4999, &t), Severity::None);
        assert_eq!(classify(0.0, &t), Severity::None);
    }

    #[test]
    fn test_exact_absorbs_rounding_noise_only() {
        let t = SimilarityThresholds::GOAL;
        let accumulated = 0.4 + 0.3 + 0.3;
        assert_eq!(classify(accumulated, &t), Severity::Exact);
        assert_eq!(classify(1.0 - 1e-6, &t), Severity::High);
    }

    #[test]
    fn test_high_or_above_is_never_downgraded() {
        for preset in [
            ThresholdPreset::Strict,
            ThresholdPreset::Default,
            ThresholdPreset::Relaxed,
            ThresholdPreset::Goal,
        ] {
            let t = preset.thresholds();
            let mut s = t.high();
            while s <= 1.0 {
                let severity = classify(s, &t);
                assert!(
                    severity == Severity::High || severity == Severity::Exact,
                    "{} classified {:?} under {}",
                    s,
                    severity,
                    preset
                );
                s += 0.005;
            }
        }
    }

    #[test]
    fn test_classification_is_monotonic() {
        let t = SimilarityThresholds::RELAXED;
        let mut previous = Severity::None;
        for step in 0..=1000 {
            let severity = classify(step as f64 / 1000.0, &t);
            assert!(severity >= previous);
            previous = severity;
        }
    }

    #[test]
    fn test_thresholds_must_be_strictly_ordered() {
        assert!(SimilarityThresholds::new(1.0, 0.9, 0.8, 0.7).is_ok());
        assert!(matches!(
            SimilarityThresholds::new(1.0, 0.8, 0.8, 0.5),
            Err(DetectionError::InvalidThresholds(_))
        ));
        assert!(matches!(
            SimilarityThresholds::new(1.2, 0.9, 0.8, 0.5),
            Err(DetectionError::InvalidThresholds(_))
        ));
    }

    #[test]
    fn test_builtin_presets_are_valid() {
        for t in [
            SimilarityThresholds::STRICT,
            SimilarityThresholds::DEFAULT,
            SimilarityThresholds::RELAXED,
            SimilarityThresholds::GOAL,
        ] {
            assert!(SimilarityThresholds::new(t.exact(), t.high(), t.moderate(), t.low()).is_ok());
        }
    }

    #[test]
    fn test_preset_selection_by_kind() {
        assert_eq!(ThresholdPreset::for_entity_type(EntityType::Measure), ThresholdPreset::Strict);
        assert_eq!(ThresholdPreset::for_entity_type(EntityType::Action), ThresholdPreset::Relaxed);
        assert_eq!(ThresholdPreset::for_entity_type(EntityType::Goal), ThresholdPreset::Goal);
        assert_eq!(
            ThresholdPreset::for_entity_type(EntityType::PersonalValue),
            ThresholdPreset::Default
        );
    }

    #[test]
    fn test_unknown_preset_fails_fast() {
        assert_eq!(
            "lenient".parse::<ThresholdPreset>(),
            Err(DetectionError::UnknownPreset("lenient".to_string()))
        );
        assert_eq!("Strict".parse::<ThresholdPreset>().unwrap(), ThresholdPreset::Strict);
    }
}
