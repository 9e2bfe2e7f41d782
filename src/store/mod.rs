// src/store/mod.rs
//! Seams between the engine and whatever holds the records.

pub mod memory;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use uuid::Uuid;

use crate::lsh::Signature;
use crate::models::candidates::{DuplicateCandidateRecord, NewDuplicateCandidate, ResolutionUpdate};
use crate::models::core::{
    ActionFields, EntityType, GoalPoolEntry, GoalTermFields, MeasureFields, PersonalValueFields, Stored,
};
use crate::models::stats_models::UpsertReport;

pub use memory::MemoryStore;

/// Everything of one kind, read from a single snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityPool {
    Actions(Vec<Stored<ActionFields>>),
    Measures(Vec<Stored<MeasureFields>>),
    PersonalValues(Vec<Stored<PersonalValueFields>>),
    GoalTerms(Vec<Stored<GoalTermFields>>),
    Goals(Vec<GoalPoolEntry>),
}

impl EntityPool {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityPool::Actions(_) => EntityType::Action,
            EntityPool::Measures(_) => EntityType::Measure,
            EntityPool::PersonalValues(_) => EntityType::PersonalValue,
            EntityPool::GoalTerms(_) => EntityType::GoalTerm,
            EntityPool::Goals(_) => EntityType::Goal,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EntityPool::Actions(v) => v.len(),
            EntityPool::Measures(v) => v.len(),
            EntityPool::PersonalValues(v) => v.len(),
            EntityPool::GoalTerms(v) => v.len(),
            EntityPool::Goals(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait EntitySource: Send + Sync {
    /// The full current set of one kind. Kinds without a pool fail with
    /// `DetectionError::NoDetector`.
    fn fetch_pool(&self, entity_type: EntityType) -> impl Future<Output = Result<EntityPool>> + Send;

    /// Actions logged within `[start, end]`.
    fn fetch_actions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Stored<ActionFields>>>> + Send;
}

pub trait CandidateStore: Send + Sync {
    /// Upserts each candidate on its unordered pair. Failures are reported
    /// per record and never undo the successful ones.
    fn upsert_candidates(
        &self,
        candidates: &[NewDuplicateCandidate],
    ) -> impl Future<Output = Result<UpsertReport>> + Send;

    fn get_candidate(&self, id: Uuid) -> impl Future<Output = Result<Option<DuplicateCandidateRecord>>> + Send;

    /// Moves a pending record to a terminal state. Returns `false` when the
    /// record is missing or no longer pending.
    fn apply_resolution(
        &self,
        id: Uuid,
        update: &ResolutionUpdate,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Stamps `reviewed_at` on a pending record. Returns `false` when the
    /// record is missing or no longer pending.
    fn mark_reviewed(&self, id: Uuid, at: DateTime<Utc>) -> impl Future<Output = Result<bool>> + Send;

    /// Pending records, most similar first.
    fn pending_candidates(&self) -> impl Future<Output = Result<Vec<DuplicateCandidateRecord>>> + Send;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedSignature {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub signature: Signature,
    pub source_text_hash: String,
    pub algorithm_version: String,
    pub computed_at: DateTime<Utc>,
}

pub trait SignatureCacheStore: Send + Sync {
    fn get_signatures(
        &self,
        entity_type: EntityType,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<HashMap<Uuid, CachedSignature>>> + Send;

    fn upsert_signatures(&self, entries: &[CachedSignature]) -> impl Future<Output = Result<usize>> + Send;

    /// Deletes entries of any other algorithm version, and entries computed
    /// before `computed_before` when given. Returns the number removed.
    fn purge_signatures(
        &self,
        current_version: &str,
        computed_before: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<u64>> + Send;
}
