// src/store/memory.rs
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DetectionError;
use crate::models::candidates::{
    canonical_pair, DuplicateCandidateRecord, DuplicateStatus, NewDuplicateCandidate, ResolutionUpdate,
};
use crate::models::core::{
    ActionFields, EntityType, GoalPoolEntry, GoalTermFields, MeasureFields, PersonalValueFields, Stored,
};
use crate::models::stats_models::{UpsertFailure, UpsertReport};
use crate::store::{CachedSignature, CandidateStore, EntityPool, EntitySource, SignatureCacheStore};

type PairKey = (EntityType, Uuid, Uuid);

#[derive(Debug, Default)]
struct MemoryState {
    actions: Vec<Stored<ActionFields>>,
    measures: Vec<Stored<MeasureFields>>,
    personal_values: Vec<Stored<PersonalValueFields>>,
    goal_terms: Vec<Stored<GoalTermFields>>,
    goals: Vec<GoalPoolEntry>,
    candidates: HashMap<PairKey, DuplicateCandidateRecord>,
    signatures: HashMap<(EntityType, Uuid), CachedSignature>,
    rejected_pairs: HashSet<(Uuid, Uuid)>,
}

/// Process-local store with the same semantics as the PostgreSQL one.
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_action(&self, id: Uuid, fields: ActionFields) {
        self.state.write().await.actions.push(Stored::new(id, fields));
    }

    pub async fn insert_measure(&self, id: Uuid, fields: MeasureFields) {
        self.state.write().await.measures.push(Stored::new(id, fields));
    }

    pub async fn insert_personal_value(&self, id: Uuid, fields: PersonalValueFields) {
        self.state.write().await.personal_values.push(Stored::new(id, fields));
    }

    pub async fn insert_goal_term(&self, id: Uuid, fields: GoalTermFields) {
        self.state.write().await.goal_terms.push(Stored::new(id, fields));
    }

    pub async fn insert_goal(&self, entry: GoalPoolEntry) {
        self.state.write().await.goals.push(entry);
    }

    /// Makes every later upsert of this pair fail, as a broken row would.
    pub async fn reject_pair(&self, a: Uuid, b: Uuid) {
        self.state.write().await.rejected_pairs.insert(canonical_pair(a, b));
    }

    pub async fn candidate_count(&self) -> usize {
        self.state.read().await.candidates.len()
    }

    pub async fn signature_count(&self) -> usize {
        self.state.read().await.signatures.len()
    }
}

impl EntitySource for MemoryStore {
    async fn fetch_pool(&self, entity_type: EntityType) -> Result<EntityPool> {
        let state = self.state.read().await;
        let pool = match entity_type {
            EntityType::Action => EntityPool::Actions(state.actions.clone()),
            EntityType::Measure => EntityPool::Measures(state.measures.clone()),
            EntityType::PersonalValue => EntityPool::PersonalValues(state.personal_values.clone()),
            EntityType::GoalTerm => EntityPool::GoalTerms(state.goal_terms.clone()),
            EntityType::Goal => EntityPool::Goals(state.goals.clone()),
            other => return Err(DetectionError::NoDetector(other).into()),
        };
        debug!("Memory store: loaded {} {} records", pool.len(), entity_type);
        Ok(pool)
    }

    async fn fetch_actions_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Stored<ActionFields>>> {
        let state = self.state.read().await;
        Ok(state
            .actions
            .iter()
            .filter(|a| a.fields.log_time >= start && a.fields.log_time <= end)
            .cloned()
            .collect())
    }
}

impl CandidateStore for MemoryStore {
    async fn upsert_candidates(&self, candidates: &[NewDuplicateCandidate]) -> Result<UpsertReport> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut report = UpsertReport::default();

        for candidate in candidates {
            let (e1, e2) = canonical_pair(candidate.entity1_id, candidate.entity2_id);
            if state.rejected_pairs.contains(&(e1, e2)) {
                warn!("Memory store: upsert rejected for pair ({}, {})", e1, e2);
                report.failed.push(UpsertFailure {
                    entity_type: candidate.entity_type,
                    entity1_id: e1,
                    entity2_id: e2,
                    error: "pair rejected by store".to_string(),
                });
                continue;
            }

            let key = (candidate.entity_type, e1, e2);
            match state.candidates.get_mut(&key) {
                Some(existing) if existing.status.is_terminal() => report.skipped_terminal += 1,
                Some(existing) => {
                    existing.similarity = candidate.similarity;
                    existing.severity = candidate.severity;
                    report.updated += 1;
                }
                None => {
                    state.candidates.insert(
                        key,
                        DuplicateCandidateRecord {
                            id: Uuid::new_v4(),
                            entity_type: candidate.entity_type,
                            entity1_id: e1,
                            entity2_id: e2,
                            similarity: candidate.similarity,
                            severity: candidate.severity,
                            status: DuplicateStatus::Pending,
                            created_at: Utc::now(),
                            reviewed_at: None,
                            resolved_at: None,
                            resolution: None,
                            notes: None,
                        },
                    );
                    report.inserted += 1;
                }
            }
        }

        Ok(report)
    }

    async fn get_candidate(&self, id: Uuid) -> Result<Option<DuplicateCandidateRecord>> {
        let state = self.state.read().await;
        Ok(state.candidates.values().find(|r| r.id == id).cloned())
    }

    async fn apply_resolution(&self, id: Uuid, update: &ResolutionUpdate) -> Result<bool> {
        if !update.status.is_terminal() {
            return Err(anyhow!("resolution must move to a terminal status, got {}", update.status));
        }
        let mut state = self.state.write().await;
        match state
            .candidates
            .values_mut()
            .find(|r| r.id == id && r.status == DuplicateStatus::Pending)
        {
            Some(record) => {
                record.status = update.status;
                record.resolution = update.resolution;
                record.notes = update.notes.clone();
                record.resolved_at = Some(update.resolved_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_reviewed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.write().await;
        match state
            .candidates
            .values_mut()
            .find(|r| r.id == id && r.status == DuplicateStatus::Pending)
        {
            Some(record) => {
                record.reviewed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn pending_candidates(&self) -> Result<Vec<DuplicateCandidateRecord>> {
        let state = self.state.read().await;
        let mut pending: Vec<DuplicateCandidateRecord> = state
            .candidates
            .values()
            .filter(|r| r.status == DuplicateStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(pending)
    }
}

impl SignatureCacheStore for MemoryStore {
    async fn get_signatures(&self, entity_type: EntityType, ids: &[Uuid]) -> Result<HashMap<Uuid, CachedSignature>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .signatures
                    .get(&(entity_type, *id))
                    .map(|cached| (*id, cached.clone()))
            })
            .collect())
    }

    async fn upsert_signatures(&self, entries: &[CachedSignature]) -> Result<usize> {
        let mut state = self.state.write().await;
        for entry in entries {
            state
                .signatures
                .insert((entry.entity_type, entry.entity_id), entry.clone());
        }
        Ok(entries.len())
    }

    async fn purge_signatures(&self, current_version: &str, computed_before: Option<DateTime<Utc>>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.signatures.len();
        state.signatures.retain(|_, cached| {
            cached.algorithm_version == current_version
                && computed_before.map_or(true, |cutoff| cached.computed_at >= cutoff)
        });
        Ok((before - state.signatures.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidates::{Resolution, Severity};

    fn candidate(a: Uuid, b: Uuid, similarity: f64) -> NewDuplicateCandidate {
        NewDuplicateCandidate::new(EntityType::PersonalValue, a, b, similarity, Severity::High)
    }

    #[tokio::test]
    async fn test_upsert_is_keyed_on_unordered_pair() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let first = store.upsert_candidates(&[candidate(a, b, 0.9)]).await.unwrap();
        assert_eq!(first.inserted, 1);

        let second = store.upsert_candidates(&[candidate(b, a, 0.92)]).await.unwrap();
        assert_eq!(second.updated, 1);
        assert_eq!(store.candidate_count().await, 1);

        let pending = store.pending_candidates().await.unwrap();
        assert_eq!(pending[0].similarity, 0.92);
    }

    #[tokio::test]
    async fn test_terminal_records_are_left_alone() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.upsert_candidates(&[candidate(a, b, 0.9)]).await.unwrap();
        let id = store.pending_candidates().await.unwrap()[0].id;

        let update = ResolutionUpdate {
            status: DuplicateStatus::Merged,
            resolution: Some(Resolution::KeepFirst),
            notes: None,
            resolved_at: Utc::now(),
        };
        assert!(store.apply_resolution(id, &update).await.unwrap());
        assert!(!store.apply_resolution(id, &update).await.unwrap());

        let report = store.upsert_candidates(&[candidate(a, b, 0.99)]).await.unwrap();
        assert_eq!(report.skipped_terminal, 1);
        let record = store.get_candidate(id).await.unwrap().unwrap();
        assert_eq!(record.status, DuplicateStatus::Merged);
        assert_eq!(record.similarity, 0.9);
    }

    #[tokio::test]
    async fn test_rejected_pair_does_not_discard_others() {
        let store = MemoryStore::new();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        store.reject_pair(ids[2], ids[3]).await;

        let report = store
            .upsert_candidates(&[candidate(ids[0], ids[1], 0.8), candidate(ids[2], ids[3], 0.8)])
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(store.candidate_count().await, 1);
    }

    #[tokio::test]
    async fn test_pending_is_ordered_by_similarity() {
        let store = MemoryStore::new();
        let batch: Vec<NewDuplicateCandidate> = [0.6, 0.95, 0.75]
            .iter()
            .map(|s| candidate(Uuid::new_v4(), Uuid::new_v4(), *s))
            .collect();
        store.upsert_candidates(&batch).await.unwrap();

        let similarities: Vec<f64> = store
            .pending_candidates()
            .await
            .unwrap()
            .iter()
            .map(|r| r.similarity)
            .collect();
        assert_eq!(similarities, vec![0.95, 0.75, 0.6]);
    }

    #[tokio::test]
    async fn test_kinds_without_pool_are_rejected() {
        let store = MemoryStore::new();
        assert!(store.fetch_pool(EntityType::Milestone).await.is_err());
    }
}
