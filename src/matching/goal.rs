// src/matching/goal.rs
//! Goals are compared on their joined context rather than on a signature:
//! expectation title (40%), term assignments (30%) and measurable targets
//! (30%).

use std::collections::HashMap;

use crate::error::DetectionError;
use crate::lsh::SignatureEngine;
use crate::matching::detector::{DuplicateDetector, PairScore};
use crate::matching::text::{normalize_text, text_similarity};
use crate::models::core::{EntityType, GoalContext, MeasureTarget};
use crate::severity::{classify, SimilarityThresholds};

const TITLE_WEIGHT: f64 = 4.0;
const TERMS_WEIGHT: f64 = 3.0;
const TARGETS_WEIGHT: f64 = 3.0;

/// Score when neither goal has any measurable target.
pub const NEUTRAL_TARGET_SCORE: f64 = 0.5;

const TARGET_EXACT: f64 = 1.0;
const TARGET_CLOSE: f64 = 0.8;
const TARGET_SAME_UNIT: f64 = 0.3;
const CLOSE_TOLERANCE: f64 = 0.1;

/// A component counts as matched in the message at or above this score.
const COMPONENT_MATCH: f64 = 0.8;

/// The three components of a goal comparison and their weighted total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalScoreBreakdown {
    pub title: f64,
    pub terms: f64,
    pub targets: f64,
    pub total: f64,
}

#[derive(Debug, Clone)]
pub struct GoalDetector {
    thresholds: SimilarityThresholds,
}

impl GoalDetector {
    pub fn new(thresholds: SimilarityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn breakdown(&self, a: &GoalContext, b: &GoalContext) -> GoalScoreBreakdown {
        let title = title_similarity(a, b);
        let terms = term_overlap(a, b);
        let targets = target_overlap(&a.targets, &b.targets);
        let total = (TITLE_WEIGHT * title + TERMS_WEIGHT * terms + TARGETS_WEIGHT * targets)
            / (TITLE_WEIGHT + TERMS_WEIGHT + TARGETS_WEIGHT);
        GoalScoreBreakdown {
            title,
            terms,
            targets,
            total,
        }
    }
}

impl Default for GoalDetector {
    fn default() -> Self {
        Self::new(SimilarityThresholds::GOAL)
    }
}

/// Expectation titles, falling back to descriptions when both titles are blank.
pub fn title_similarity(a: &GoalContext, b: &GoalContext) -> f64 {
    if normalize_text(&a.title).is_empty() && normalize_text(&b.title).is_empty() {
        return match (a.description.as_deref(), b.description.as_deref()) {
            (Some(left), Some(right)) => text_similarity(left, right),
            _ => 0.0,
        };
    }
    text_similarity(&a.title, &b.title)
}

/// Jaccard overlap of the term numbers. No assignments on either side is
/// not agreement.
pub fn term_overlap(a: &GoalContext, b: &GoalContext) -> f64 {
    if a.term_numbers.is_empty() && b.term_numbers.is_empty() {
        return 0.0;
    }
    let shared = a.term_numbers.intersection(&b.term_numbers).count() as f64;
    let union = a.term_numbers.union(&b.term_numbers).count() as f64;
    shared / union
}

fn by_unit(targets: &[MeasureTarget]) -> HashMap<String, f64> {
    let mut units = HashMap::new();
    for target in targets {
        units
            .entry(normalize_text(&target.unit))
            .or_insert(target.target_value);
    }
    units
}

fn unit_score(a: f64, b: f64) -> f64 {
    if a == b && a != 0.0 {
        return TARGET_EXACT;
    }
    let larger = a.abs().max(b.abs());
    if larger > 0.0 && (a - b).abs() <= CLOSE_TOLERANCE * larger {
        return TARGET_CLOSE;
    }
    TARGET_SAME_UNIT
}

/// Per-unit agreement of the measurable targets averaged over the union of
/// units. Units present on one side only contribute 0.
pub fn target_overlap(a: &[MeasureTarget], b: &[MeasureTarget]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return NEUTRAL_TARGET_SCORE;
    }

    let left = by_unit(a);
    let right = by_unit(b);
    let mut units: Vec<&String> = left.keys().chain(right.keys()).collect();
    units.sort();
    units.dedup();

    let total: f64 = units
        .iter()
        .map(|unit| match (left.get(*unit), right.get(*unit)) {
            (Some(x), Some(y)) => unit_score(*x, *y),
            _ => 0.0,
        })
        .sum();

    total / units.len() as f64
}

fn describe(breakdown: &GoalScoreBreakdown) -> String {
    let mut matched = Vec::new();
    let mut differs = Vec::new();
    for (name, value) in [
        ("title", breakdown.title),
        ("terms", breakdown.terms),
        ("targets", breakdown.targets),
    ] {
        if value >= COMPONENT_MATCH {
            matched.push(name);
        } else {
            differs.push(name);
        }
    }

    let mut message = format!("Similar goal ({:.0}% match).", breakdown.total * 100.0);
    if !matched.is_empty() {
        message.push_str(&format!(" Matched: {}.", matched.join(", ")));
    }
    if !differs.is_empty() {
        message.push_str(&format!(" Differs: {}.", differs.join(", ")));
    }
    message
}

impl DuplicateDetector for GoalDetector {
    type Fields = GoalContext;
    type Profile = GoalContext;

    fn entity_type(&self) -> EntityType {
        EntityType::Goal
    }

    fn thresholds(&self) -> &SimilarityThresholds {
        &self.thresholds
    }

    fn semantic_content(&self, fields: &GoalContext) -> Vec<String> {
        vec![fields.title.clone(), fields.description.clone().unwrap_or_default()]
    }

    fn profile(&self, _engine: &SignatureEngine, fields: &GoalContext) -> Result<GoalContext, DetectionError> {
        Ok(fields.clone())
    }

    fn score(&self, _engine: &SignatureEngine, a: &GoalContext, b: &GoalContext) -> Result<PairScore, DetectionError> {
        let breakdown = self.breakdown(a, b);
        let severity = classify(breakdown.total, &self.thresholds);
        let message = if severity.is_reportable() {
            describe(&breakdown)
        } else {
            String::new()
        };
        Ok(PairScore {
            similarity: breakdown.total,
            severity,
            message,
        })
    }
}
