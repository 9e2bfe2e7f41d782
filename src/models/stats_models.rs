// src/models/stats_models.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::candidates::DetectedPair;
use crate::models::core::EntityType;

/// Per-kind statistics of one batch scan.
#[derive(Debug, Clone, Serialize)]
pub struct EntityScanStats {
    pub entity_type: EntityType,
    pub entities_scanned: usize,
    pub pairs_compared: usize,
    pub candidates_found: usize,
    pub pair_failures: usize,
    pub signature_cache_hits: usize,
    pub elapsed_secs: f64,
}

impl EntityScanStats {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            entities_scanned: 0,
            pairs_compared: 0,
            candidates_found: 0,
            pair_failures: 0,
            signature_cache_hits: 0,
            elapsed_secs: 0.0,
        }
    }
}

/// A comparison that could not be performed. Recoverable: the scan carries on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairFailure {
    pub entity_type: EntityType,
    pub entity1_id: Uuid,
    pub entity2_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertFailure {
    pub entity_type: EntityType,
    pub entity1_id: Uuid,
    pub entity2_id: Uuid,
    pub error: String,
}

/// Outcome of persisting one scan's candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    /// Pairs already reviewed; left untouched.
    pub skipped_terminal: usize,
    pub failed: Vec<UpsertFailure>,
}

impl UpsertReport {
    pub fn persisted(&self) -> usize {
        self.inserted + self.updated
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub kinds: Vec<EntityScanStats>,
    pub candidates: Vec<DetectedPair>,
    pub failures: Vec<PairFailure>,
    pub persistence: UpsertReport,
    pub cancelled: bool,
}

impl ScanResult {
    pub fn total_candidates(&self) -> usize {
        self.candidates.len()
    }
}
