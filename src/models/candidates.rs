// src/models/candidates.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::DetectionError;
use crate::models::core::EntityType;

/// Discrete tier summarising a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Moderate,
    High,
    Exact,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Exact => "exact",
            Severity::High => "high",
            Severity::Moderate => "moderate",
            Severity::Low => "low",
            Severity::None => "none",
        }
    }

    pub fn is_reportable(&self) -> bool {
        *self != Severity::None
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Severity::Exact),
            "high" => Ok(Severity::High),
            "moderate" => Ok(Severity::Moderate),
            "low" => Ok(Severity::Low),
            "none" => Ok(Severity::None),
            other => Err(DetectionError::UnknownVariant {
                kind: "severity",
                value: other.to_string(),
            }),
        }
    }
}

/// Review status of a persisted candidate. `Pending` is the only
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStatus {
    Pending,
    Merged,
    Ignored,
    Resolved,
}

impl DuplicateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateStatus::Pending => "pending",
            DuplicateStatus::Merged => "merged",
            DuplicateStatus::Ignored => "ignored",
            DuplicateStatus::Resolved => "resolved",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self != DuplicateStatus::Pending
    }

    pub fn can_transition_to(&self, next: DuplicateStatus) -> bool {
        *self == DuplicateStatus::Pending && next.is_terminal()
    }
}

impl fmt::Display for DuplicateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateStatus {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(DuplicateStatus::Pending),
            "merged" => Ok(DuplicateStatus::Merged),
            "ignored" => Ok(DuplicateStatus::Ignored),
            "resolved" => Ok(DuplicateStatus::Resolved),
            other => Err(DetectionError::UnknownVariant {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// What the reviewer decided to do with the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    KeepFirst,
    KeepSecond,
    KeepBoth,
    Merged,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::KeepFirst => "keep_first",
            Resolution::KeepSecond => "keep_second",
            Resolution::KeepBoth => "keep_both",
            Resolution::Merged => "merged",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "keep_first" => Ok(Resolution::KeepFirst),
            "keep_second" => Ok(Resolution::KeepSecond),
            "keep_both" => Ok(Resolution::KeepBoth),
            "merged" => Ok(Resolution::Merged),
            other => Err(DetectionError::UnknownVariant {
                kind: "resolution",
                value: other.to_string(),
            }),
        }
    }
}

/// Transient result of a duplicate check. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub entity_id: Uuid,
    pub similarity: f64,
    pub severity: Severity,
    pub message: String,
}

/// A pair surfaced by a batch scan, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPair {
    pub entity_type: EntityType,
    pub entity1_id: Uuid,
    pub entity2_id: Uuid,
    pub similarity: f64,
    pub severity: Severity,
    pub message: String,
}

/// Orders two ids so an unordered pair always has one key.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Upsert payload for the candidate store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDuplicateCandidate {
    pub entity_type: EntityType,
    pub entity1_id: Uuid,
    pub entity2_id: Uuid,
    pub similarity: f64,
    pub severity: Severity,
}

impl NewDuplicateCandidate {
    pub fn new(entity_type: EntityType, a: Uuid, b: Uuid, similarity: f64, severity: Severity) -> Self {
        let (entity1_id, entity2_id) = canonical_pair(a, b);
        Self {
            entity_type,
            entity1_id,
            entity2_id,
            similarity: similarity.clamp(0.0, 1.0),
            severity,
        }
    }
}

impl From<&DetectedPair> for NewDuplicateCandidate {
    fn from(pair: &DetectedPair) -> Self {
        NewDuplicateCandidate::new(
            pair.entity_type,
            pair.entity1_id,
            pair.entity2_id,
            pair.similarity,
            pair.severity,
        )
    }
}

/// A persisted candidate awaiting or past human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidateRecord {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity1_id: Uuid,
    pub entity2_id: Uuid,
    pub similarity: f64,
    pub severity: Severity,
    pub status: DuplicateStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<Resolution>,
    pub notes: Option<String>,
}

/// Terminal transition applied by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionUpdate {
    pub status: DuplicateStatus,
    pub resolution: Option<Resolution>,
    pub notes: Option<String>,
    pub resolved_at: DateTime<Utc>,
}
