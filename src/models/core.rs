// src/models/core.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::DetectionError;

/// The closed set of record kinds a duplicate candidate can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Action,
    Expectation,
    Measure,
    PersonalValue,
    TimePeriod,
    Goal,
    Milestone,
    Obligation,
    GoalTerm,
}

impl EntityType {
    pub const ALL: [EntityType; 9] = [
        EntityType::Action,
        EntityType::Expectation,
        EntityType::Measure,
        EntityType::PersonalValue,
        EntityType::TimePeriod,
        EntityType::Goal,
        EntityType::Milestone,
        EntityType::Obligation,
        EntityType::GoalTerm,
    ];

    /// Kinds with a detector, in the fixed order batch scans visit them.
    pub const SCAN_ORDER: [EntityType; 5] = [
        EntityType::Measure,
        EntityType::PersonalValue,
        EntityType::GoalTerm,
        EntityType::Action,
        EntityType::Goal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Action => "action",
            EntityType::Expectation => "expectation",
            EntityType::Measure => "measure",
            EntityType::PersonalValue => "personal_value",
            EntityType::TimePeriod => "time_period",
            EntityType::Goal => "goal",
            EntityType::Milestone => "milestone",
            EntityType::Obligation => "obligation",
            EntityType::GoalTerm => "goal_term",
        }
    }

    /// Human label used in candidate messages.
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Action => "action",
            EntityType::Expectation => "expectation",
            EntityType::Measure => "measure",
            EntityType::PersonalValue => "value",
            EntityType::TimePeriod => "time period",
            EntityType::Goal => "goal",
            EntityType::Milestone => "milestone",
            EntityType::Obligation => "obligation",
            EntityType::GoalTerm => "term",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| DetectionError::UnknownEntityType(s.to_string()))
    }
}

/// A persisted record: its identity plus the comparable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub id: Uuid,
    pub fields: T,
}

impl<T> Stored<T> {
    pub fn new(id: Uuid, fields: T) -> Self {
        Self { id, fields }
    }
}

/// A logged action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFields {
    pub title: String,
    pub description: Option<String>,
    pub log_time: DateTime<Utc>,
}

/// A measurement unit from the catalog, e.g. `km` of type `distance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureFields {
    pub unit: String,
    pub unit_type: String,
}

/// A personal value. `value_level` is the value tier tag
/// (`general`, `major`, `highest_order`, `life_area`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalValueFields {
    pub title: String,
    pub value_level: String,
    pub life_domain: Option<String>,
}

/// A planning term. Term numbers are unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalTermFields {
    pub term_number: i32,
    pub theme: Option<String>,
}

/// One measurable target attached to a goal's expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureTarget {
    pub unit: String,
    pub target_value: f64,
}

/// The joined view of a goal: its expectation text, measurable targets and
/// term assignments. Used both for stored goals and for pre-save checks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GoalContext {
    pub title: String,
    pub description: Option<String>,
    pub targets: Vec<MeasureTarget>,
    pub term_numbers: BTreeSet<i32>,
}

/// A goal as loaded for a batch scan. `context` is `None` when the linked
/// expectation could not be found; comparisons involving it are reported as
/// per-pair failures.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalPoolEntry {
    pub id: Uuid,
    pub expectation_id: Option<Uuid>,
    pub context: Option<GoalContext>,
}
