// src/matching/manager.rs - Coordinates proactive checks, batch scans and candidate review
use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use log::{info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::DetectionError;
use crate::lsh::{CompositeInput, Signature, SignatureEngine};
use crate::matching::detector::{pair_count, Detector, DetectorSet, DuplicateDetector};
use crate::matching::goal::GoalDetector;
use crate::models::candidates::{
    DetectedPair, DuplicateCandidate, DuplicateCandidateRecord, DuplicateStatus, NewDuplicateCandidate,
    Resolution, ResolutionUpdate, Severity,
};
use crate::models::core::{
    ActionFields, EntityType, GoalContext, GoalPoolEntry, GoalTermFields, MeasureFields, PersonalValueFields, Stored,
};
use crate::models::stats_models::{EntityScanStats, PairFailure, ScanResult, UpsertReport};
use crate::store::{CachedSignature, CandidateStore, EntityPool, EntitySource, SignatureCacheStore};
use crate::utils::cancellation::ScanCancellation;
use crate::utils::config::DetectionConfig;
use crate::utils::logging::DetectionLogger;
use crate::utils::progress_callback::{report, ProgressCallback};
use crate::utils::signature_cache::{is_fresh, source_text_hash};

/// Result of scanning one entity kind, before persistence.
struct KindScan {
    stats: EntityScanStats,
    pairs: Vec<DetectedPair>,
    failures: Vec<PairFailure>,
}

/// The only writer of candidate status. Reads entities from `S`, keeps
/// candidates and cached signatures in `C`.
pub struct DeduplicationManager<S, C> {
    source: S,
    store: C,
    engine: Arc<SignatureEngine>,
    detectors: DetectorSet,
    config: DetectionConfig,
}

impl<S, C> DeduplicationManager<S, C>
where
    S: EntitySource,
    C: CandidateStore + SignatureCacheStore,
{
    pub fn new(source: S, store: C, config: DetectionConfig) -> Result<Self, DetectionError> {
        let engine = Arc::new(config.build_engine()?);
        let detectors = DetectorSet::from_config(&config);
        Ok(Self {
            source,
            store,
            engine,
            detectors,
            config,
        })
    }

    pub fn engine(&self) -> &SignatureEngine {
        &self.engine
    }

    pub fn detectors(&self) -> &DetectorSet {
        &self.detectors
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// True when any candidate is an exact duplicate and the save should be
    /// refused. Lower severities are advisory.
    pub fn blocks_submission(candidates: &[DuplicateCandidate]) -> bool {
        candidates.iter().any(|c| c.severity == Severity::Exact)
    }

    // ---- Proactive checks ----

    /// Compares a new action against actions logged within the configured
    /// window around its log time.
    pub async fn check_action_duplicate(&self, fields: &ActionFields) -> Result<Vec<DuplicateCandidate>> {
        let minutes = self.config.action_window_minutes;
        let window = Duration::try_minutes(minutes).ok_or_else(|| {
            DetectionError::Config(format!("action window of {} minutes is out of range", minutes))
        })?;
        let (from, to) = fields
            .log_time
            .checked_sub_signed(window)
            .zip(fields.log_time.checked_add_signed(window))
            .ok_or_else(|| {
                DetectionError::Config(format!(
                    "action window of {} minutes overflows log time {}",
                    minutes, fields.log_time
                ))
            })?;
        let pool = self
            .source
            .fetch_actions_between(from, to)
            .await
            .context("Failed to load actions around the new log time")?;
        Ok(self.detectors.action.check_before_save(&self.engine, fields, &pool)?)
    }

    pub async fn check_measure_duplicate(&self, fields: &MeasureFields) -> Result<Vec<DuplicateCandidate>> {
        let pool = match self.fetch(EntityType::Measure).await? {
            EntityPool::Measures(items) => items,
            other => bail!("Expected a measure pool, got {}", other.entity_type()),
        };
        Ok(self.detectors.measure.check_before_save(&self.engine, fields, &pool)?)
    }

    pub async fn check_personal_value_duplicate(
        &self,
        fields: &PersonalValueFields,
    ) -> Result<Vec<DuplicateCandidate>> {
        let pool = match self.fetch(EntityType::PersonalValue).await? {
            EntityPool::PersonalValues(items) => items,
            other => bail!("Expected a personal value pool, got {}", other.entity_type()),
        };
        Ok(self
            .detectors
            .personal_value
            .check_before_save(&self.engine, fields, &pool)?)
    }

    pub async fn check_goal_term_duplicate(&self, fields: &GoalTermFields) -> Result<Vec<DuplicateCandidate>> {
        let pool = match self.fetch(EntityType::GoalTerm).await? {
            EntityPool::GoalTerms(items) => items,
            other => bail!("Expected a goal term pool, got {}", other.entity_type()),
        };
        Ok(self.detectors.goal_term.check_before_save(&self.engine, fields, &pool)?)
    }

    /// Checks a goal about to be saved, given its joined context. Stored
    /// goals whose context is missing are skipped.
    pub async fn check_goal_duplicate(&self, context: &GoalContext) -> Result<Vec<DuplicateCandidate>> {
        let entries = match self.fetch(EntityType::Goal).await? {
            EntityPool::Goals(entries) => entries,
            other => bail!("Expected a goal pool, got {}", other.entity_type()),
        };
        let mut pool = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.context {
                Some(ctx) => pool.push(Stored::new(entry.id, ctx)),
                None => warn!("Goal {} has no expectation context; left out of the check", entry.id),
            }
        }
        Ok(self.detectors.goal.check_before_save(&self.engine, context, &pool)?)
    }

    async fn fetch(&self, entity_type: EntityType) -> Result<EntityPool> {
        self.source
            .fetch_pool(entity_type)
            .await
            .with_context(|| format!("Failed to load {} pool", entity_type))
    }

    // ---- Batch scans ----

    /// Scans every detectable kind in the fixed order.
    pub async fn scan_for_duplicates(&self, cancel: &ScanCancellation) -> Result<ScanResult> {
        self.scan_entity_types(&EntityType::SCAN_ORDER, cancel, None).await
    }

    /// Scans the given kinds (visited in the fixed scan order), then persists
    /// everything found in one batch. Cancellation is checked before each
    /// kind; kinds already scanned are still persisted.
    pub async fn scan_entity_types(
        &self,
        kinds: &[EntityType],
        cancel: &ScanCancellation,
        progress: Option<ProgressCallback>,
    ) -> Result<ScanResult> {
        for kind in kinds {
            self.detectors.get(*kind)?;
        }
        let ordered: Vec<EntityType> = EntityType::SCAN_ORDER
            .iter()
            .copied()
            .filter(|k| kinds.contains(k))
            .collect();

        let scan_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            "🔍 Starting duplicate scan {} over {} entity kinds",
            scan_id,
            ordered.len()
        );

        let mut kind_stats = Vec::with_capacity(ordered.len());
        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        let mut cancelled = false;

        for (index, kind) in ordered.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    "🛑 Scan {} cancelled before {}; persisting results of {} completed kinds",
                    scan_id,
                    kind,
                    kind_stats.len()
                );
                cancelled = true;
                break;
            }

            report(
                &progress,
                format!("Scanning {}", kind),
                Some(format!("{}/{}", index + 1, ordered.len())),
            );
            let scanned = self.scan_kind(*kind, &scan_id.to_string()).await?;
            report(
                &progress,
                format!("Scanned {}", kind),
                Some(format!(
                    "{} candidates, {} pair failures",
                    scanned.stats.candidates_found, scanned.stats.pair_failures
                )),
            );

            kind_stats.push(scanned.stats);
            candidates.extend(scanned.pairs);
            failures.extend(scanned.failures);
        }

        let persistence = if candidates.is_empty() {
            UpsertReport::default()
        } else {
            report(&progress, "Persisting candidates", Some(candidates.len().to_string()));
            let batch: Vec<NewDuplicateCandidate> = candidates.iter().map(NewDuplicateCandidate::from).collect();
            self.store
                .upsert_candidates(&batch)
                .await
                .context("Failed to persist duplicate candidates")?
        };

        if !persistence.failed.is_empty() {
            warn!(
                "⚠️  {} candidate upserts failed in scan {}",
                persistence.failed.len(),
                scan_id
            );
        }
        info!(
            "✅ Scan {} finished: {} candidates ({} new, {} refreshed, {} already reviewed), {} pair failures{}",
            scan_id,
            candidates.len(),
            persistence.inserted,
            persistence.updated,
            persistence.skipped_terminal,
            failures.len(),
            if cancelled { " [cancelled]" } else { "" }
        );

        Ok(ScanResult {
            scan_id,
            started_at,
            finished_at: Utc::now(),
            kinds: kind_stats,
            candidates,
            failures,
            persistence,
            cancelled,
        })
    }

    async fn scan_kind(&self, kind: EntityType, scan_id: &str) -> Result<KindScan> {
        let logger = DetectionLogger::new(kind);
        logger.log_start(scan_id);

        let detector = self.detectors.get(kind)?;
        let pool = self.fetch(kind).await?;
        logger.log_data_loaded(pool.len());

        let mut stats = EntityScanStats::new(kind);
        stats.entities_scanned = pool.len();

        let (pairs, failures) = match (detector, pool) {
            (Detector::Action(d), EntityPool::Actions(items)) => {
                self.scan_signature_kind(d, items, &mut stats, &logger).await?
            }
            (Detector::Measure(d), EntityPool::Measures(items)) => {
                self.scan_signature_kind(d, items, &mut stats, &logger).await?
            }
            (Detector::PersonalValue(d), EntityPool::PersonalValues(items)) => {
                self.scan_signature_kind(d, items, &mut stats, &logger).await?
            }
            (Detector::GoalTerm(d), EntityPool::GoalTerms(items)) => {
                let profiles: Vec<(Uuid, GoalTermFields)> = items.into_iter().map(|s| (s.id, s.fields)).collect();
                stats.pairs_compared = pair_count(profiles.len());
                logger.log_pair_generation(stats.pairs_compared);
                (self.score_in_background(d.clone(), profiles).await?, Vec::new())
            }
            (Detector::Goal(d), EntityPool::Goals(entries)) => {
                self.scan_goal_kind(d, entries, &mut stats, &logger).await?
            }
            (detector, pool) => bail!(
                "A {} pool cannot be scanned by the {} detector",
                pool.entity_type(),
                detector.entity_type()
            ),
        };

        for pair in &pairs {
            logger.log_candidate(
                &pair.entity1_id.to_string(),
                &pair.entity2_id.to_string(),
                pair.similarity,
                pair.severity.as_str(),
            );
        }
        stats.candidates_found = pairs.len();
        stats.pair_failures = failures.len();
        stats.elapsed_secs = logger.elapsed_secs();
        logger.log_completion(&stats);

        Ok(KindScan {
            stats,
            pairs,
            failures,
        })
    }

    /// Pairwise scoring runs on the blocking pool; rows are spread over rayon.
    async fn score_in_background<D>(&self, detector: D, profiles: Vec<(Uuid, D::Profile)>) -> Result<Vec<DetectedPair>>
    where
        D: DuplicateDetector + Clone + 'static,
        D::Profile: 'static,
    {
        let engine = Arc::clone(&self.engine);
        let pairs = tokio::task::spawn_blocking(move || detector.scan_profiles(&engine, &profiles))
            .await
            .context("Pair scoring task failed")??;
        Ok(pairs)
    }

    async fn scan_signature_kind<D>(
        &self,
        detector: &D,
        items: Vec<Stored<D::Fields>>,
        stats: &mut EntityScanStats,
        logger: &DetectionLogger,
    ) -> Result<(Vec<DetectedPair>, Vec<PairFailure>)>
    where
        D: DuplicateDetector<Profile = Signature> + Clone + 'static,
    {
        let profiles = self.signature_profiles(detector, &items, stats).await?;
        logger.log_cache_results(stats.signature_cache_hits, items.len() - stats.signature_cache_hits);

        stats.pairs_compared = pair_count(profiles.len());
        logger.log_pair_generation(stats.pairs_compared);
        let pairs = self.score_in_background(detector.clone(), profiles).await?;
        Ok((pairs, Vec::new()))
    }

    /// Signatures for a pool, reusing fresh cache entries and computing the
    /// rest in parallel. New signatures are written back in one batch.
    async fn signature_profiles<D>(
        &self,
        detector: &D,
        items: &[Stored<D::Fields>],
        stats: &mut EntityScanStats,
    ) -> Result<Vec<(Uuid, Signature)>>
    where
        D: DuplicateDetector<Profile = Signature>,
    {
        let kind = detector.entity_type();
        let version = self.engine.algorithm_version();
        let shingle_size = self.engine.shingle_size();

        let mut inputs: Vec<(Uuid, CompositeInput, String)> = Vec::with_capacity(items.len());
        for item in items {
            let input = detector.composite_input(&item.fields)?;
            let hash = source_text_hash(&input, shingle_size);
            inputs.push((item.id, input, hash));
        }

        let cached: HashMap<Uuid, CachedSignature> = if self.config.use_signature_cache {
            let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
            self.store
                .get_signatures(kind, &ids)
                .await
                .with_context(|| format!("Failed to read cached {} signatures", kind))?
        } else {
            HashMap::new()
        };

        let mut slots: Vec<Option<Signature>> = Vec::with_capacity(inputs.len());
        let mut missing: Vec<(usize, CompositeInput)> = Vec::new();
        for (index, (id, input, hash)) in inputs.iter().enumerate() {
            match cached.get(id) {
                Some(entry) if is_fresh(entry, hash, &version) && entry.signature.len() == self.engine.num_hashes() => {
                    stats.signature_cache_hits += 1;
                    slots.push(Some(entry.signature.clone()));
                }
                _ => {
                    slots.push(None);
                    missing.push((index, input.clone()));
                }
            }
        }

        let engine = Arc::clone(&self.engine);
        let computed: Vec<(usize, Signature)> = tokio::task::spawn_blocking(move || {
            missing
                .into_par_iter()
                .map(|(index, input)| (index, engine.composite_signature(&input)))
                .collect()
        })
        .await
        .context("Signature computation task failed")?;

        let now = Utc::now();
        let mut fresh_entries = Vec::with_capacity(computed.len());
        for (index, signature) in computed {
            let (id, _, hash) = &inputs[index];
            if self.config.use_signature_cache {
                fresh_entries.push(CachedSignature {
                    entity_type: kind,
                    entity_id: *id,
                    signature: signature.clone(),
                    source_text_hash: hash.clone(),
                    algorithm_version: version.clone(),
                    computed_at: now,
                });
            }
            slots[index] = Some(signature);
        }

        if !fresh_entries.is_empty() {
            if let Err(e) = self.store.upsert_signatures(&fresh_entries).await {
                warn!("Failed to cache {} {} signatures: {:#}", fresh_entries.len(), kind, e);
            }
        }

        let mut profiles = Vec::with_capacity(slots.len());
        for ((id, _, _), slot) in inputs.iter().zip(slots) {
            match slot {
                Some(signature) => profiles.push((*id, signature)),
                None => bail!("Signature for {} {} was never computed", kind, id),
            }
        }
        Ok(profiles)
    }

    /// Goals without joined context cannot be compared; each pair involving
    /// one becomes a `PairFailure` and the rest of the pool is still scanned.
    async fn scan_goal_kind(
        &self,
        detector: &GoalDetector,
        entries: Vec<GoalPoolEntry>,
        stats: &mut EntityScanStats,
        logger: &DetectionLogger,
    ) -> Result<(Vec<DetectedPair>, Vec<PairFailure>)> {
        let mut failures = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            for other in &entries[i + 1..] {
                let missing = if entry.context.is_none() {
                    Some(entry)
                } else if other.context.is_none() {
                    Some(other)
                } else {
                    None
                };
                if let Some(broken) = missing {
                    failures.push(PairFailure {
                        entity_type: EntityType::Goal,
                        entity1_id: entry.id,
                        entity2_id: other.id,
                        reason: match broken.expectation_id {
                            Some(expectation_id) => format!(
                                "expectation {} linked from goal {} was not found",
                                expectation_id, broken.id
                            ),
                            None => format!("goal {} has no linked expectation", broken.id),
                        },
                    });
                }
            }
        }

        let total = entries.len();
        let mut profiles = Vec::with_capacity(total);
        for entry in entries {
            match entry.context {
                Some(context) => profiles.push((entry.id, context)),
                None => logger.log_missing_context(&entry.id.to_string(), total.saturating_sub(1)),
            }
        }

        stats.pairs_compared = pair_count(profiles.len());
        logger.log_pair_generation(stats.pairs_compared);
        let pairs = self.score_in_background(detector.clone(), profiles).await?;
        Ok((pairs, failures))
    }

    // ---- Review ----

    /// Pending candidates, most similar first.
    pub async fn get_pending_duplicates(&self) -> Result<Vec<DuplicateCandidateRecord>> {
        self.store
            .pending_candidates()
            .await
            .context("Failed to load pending duplicate candidates")
    }

    /// Moves a pending record to `status` (which must be terminal), stamping
    /// `resolved_at`.
    pub async fn resolve_duplicate(
        &self,
        record_id: Uuid,
        status: DuplicateStatus,
        resolution: Option<Resolution>,
        notes: Option<String>,
    ) -> Result<()> {
        let record = self
            .store
            .get_candidate(record_id)
            .await
            .context("Failed to load duplicate candidate")?
            .ok_or(DetectionError::CandidateNotFound(record_id))?;

        if !record.status.can_transition_to(status) {
            return Err(DetectionError::InvalidTransition {
                from: record.status,
                to: status,
            }
            .into());
        }

        let update = ResolutionUpdate {
            status,
            resolution,
            notes,
            resolved_at: Utc::now(),
        };
        let applied = self
            .store
            .apply_resolution(record_id, &update)
            .await
            .context("Failed to resolve duplicate candidate")?;

        if !applied {
            let current = self
                .store
                .get_candidate(record_id)
                .await?
                .map(|r| r.status)
                .unwrap_or(record.status);
            return Err(DetectionError::InvalidTransition { from: current, to: status }.into());
        }

        info!(
            "📝 Resolved {} candidate {} as {}{}",
            record.entity_type,
            record_id,
            status,
            resolution.map(|r| format!(" ({})", r)).unwrap_or_default()
        );
        Ok(())
    }

    /// Stamps `reviewed_at` without changing status. Reviewing a record that
    /// is already resolved changes nothing.
    pub async fn mark_reviewed(&self, record_id: Uuid) -> Result<()> {
        let record = self
            .store
            .get_candidate(record_id)
            .await
            .context("Failed to load duplicate candidate")?
            .ok_or(DetectionError::CandidateNotFound(record_id))?;

        if record.status.is_terminal() {
            warn!("Candidate {} is already {}; review stamp not applied", record_id, record.status);
            return Ok(());
        }

        self.store
            .mark_reviewed(record_id, Utc::now())
            .await
            .context("Failed to mark duplicate candidate reviewed")?;
        Ok(())
    }

    /// Removes cached signatures from other algorithm versions and, when
    /// `older_than` is given, entries computed longer ago than that.
    pub async fn purge_stale_signatures(&self, older_than: Option<Duration>) -> Result<u64> {
        let cutoff = match older_than {
            Some(age) => Some(Utc::now().checked_sub_signed(age).ok_or_else(|| {
                DetectionError::Config(format!("signature age cutoff of {} is out of range", age))
            })?),
            None => None,
        };
        let removed = self
            .store
            .purge_signatures(&self.engine.algorithm_version(), cutoff)
            .await
            .context("Failed to purge cached signatures")?;
        info!("🧹 Purged {} stale cached signatures", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::MeasureTarget;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn manager(store: &MemoryStore) -> DeduplicationManager<MemoryStore, MemoryStore> {
        DeduplicationManager::new(store.clone(), store.clone(), DetectionConfig::default()).unwrap()
    }

    fn measure(unit: &str, unit_type: &str) -> MeasureFields {
        MeasureFields {
            unit: unit.to_string(),
            unit_type: unit_type.to_string(),
        }
    }

    fn goal_context(title: &str, km: f64, terms: &[i32]) -> GoalContext {
        GoalContext {
            title: title.to_string(),
            description: None,
            targets: vec![MeasureTarget {
                unit: "km".to_string(),
                target_value: km,
            }],
            term_numbers: terms.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    fn detection_error(err: &anyhow::Error) -> Option<&DetectionError> {
        err.downcast_ref::<DetectionError>()
    }

    #[tokio::test]
    async fn test_candidate_lifecycle_across_scans() {
        let store = MemoryStore::new();
        store.insert_measure(Uuid::new_v4(), measure("kg", "mass")).await;
        store.insert_measure(Uuid::new_v4(), measure("KG", "Mass")).await;
        store.insert_measure(Uuid::new_v4(), measure("hours", "time")).await;
        let manager = manager(&store);
        let cancel = ScanCancellation::new();

        let first = manager.scan_for_duplicates(&cancel).await.unwrap();
        assert_eq!(first.total_candidates(), 1);
        assert_eq!(first.persistence.inserted, 1);

        let second = manager.scan_for_duplicates(&cancel).await.unwrap();
        assert_eq!(second.persistence.inserted, 0);
        assert_eq!(second.persistence.updated, 1);
        assert_eq!(store.candidate_count().await, 1);

        let pending = manager.get_pending_duplicates().await.unwrap();
        assert_eq!(pending.len(), 1);
        manager
            .resolve_duplicate(pending[0].id, DuplicateStatus::Ignored, Some(Resolution::KeepBoth), None)
            .await
            .unwrap();
        assert!(manager.get_pending_duplicates().await.unwrap().is_empty());

        let third = manager.scan_for_duplicates(&cancel).await.unwrap();
        assert_eq!(third.persistence.skipped_terminal, 1);
        assert!(manager.get_pending_duplicates().await.unwrap().is_empty());

        let record = store.get_candidate(pending[0].id).await.unwrap().unwrap();
        assert_eq!(record.status, DuplicateStatus::Ignored);
        assert!(record.resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_distinct_units_produce_no_candidate() {
        let store = MemoryStore::new();
        store.insert_measure(Uuid::new_v4(), measure("km", "length")).await;
        store.insert_measure(Uuid::new_v4(), measure("miles", "length")).await;
        let manager = manager(&store);

        let result = manager
            .scan_entity_types(&[EntityType::Measure], &ScanCancellation::new(), None)
            .await
            .unwrap();
        assert_eq!(result.kinds.len(), 1);
        assert_eq!(result.kinds[0].pairs_compared, 1);
        assert!(result.candidates.is_empty());
        assert_eq!(store.candidate_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_goal_context_fails_only_its_pairs() {
        let store = MemoryStore::new();
        let broken = Uuid::new_v4();
        store
            .insert_goal(GoalPoolEntry {
                id: Uuid::new_v4(),
                expectation_id: Some(Uuid::new_v4()),
                context: Some(goal_context("Run a marathon", 42.2, &[1])),
            })
            .await;
        store
            .insert_goal(GoalPoolEntry {
                id: broken,
                expectation_id: Some(Uuid::new_v4()),
                context: None,
            })
            .await;
        store
            .insert_goal(GoalPoolEntry {
                id: Uuid::new_v4(),
                expectation_id: Some(Uuid::new_v4()),
                context: Some(goal_context("Run a Marathon", 42.2, &[1])),
            })
            .await;
        let manager = manager(&store);

        let result = manager
            .scan_entity_types(&[EntityType::Goal], &ScanCancellation::new(), None)
            .await
            .unwrap();

        assert_eq!(result.failures.len(), 2);
        assert!(result
            .failures
            .iter()
            .all(|f| f.entity1_id == broken || f.entity2_id == broken));
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].severity, Severity::Exact);
        assert_eq!(result.kinds[0].pairs_compared, 1);
    }

    #[tokio::test]
    async fn test_cancellation_between_kinds_keeps_completed_work() {
        let store = MemoryStore::new();
        store.insert_measure(Uuid::new_v4(), measure("kg", "mass")).await;
        store.insert_measure(Uuid::new_v4(), measure("kg", "mass")).await;
        store
            .insert_goal_term(Uuid::new_v4(), GoalTermFields { term_number: 1, theme: None })
            .await;
        store
            .insert_goal_term(Uuid::new_v4(), GoalTermFields { term_number: 1, theme: None })
            .await;
        let manager = manager(&store);

        let cancel = ScanCancellation::new();
        let trigger = cancel.clone();
        let progress: ProgressCallback = Arc::new(move |phase: String, _detail: Option<String>| {
            if phase.starts_with("Scanned") {
                trigger.cancel();
            }
        });

        let result = manager
            .scan_entity_types(&EntityType::SCAN_ORDER, &cancel, Some(progress))
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.kinds.len(), 1);
        assert_eq!(result.kinds[0].entity_type, EntityType::Measure);
        assert_eq!(result.persistence.inserted, 1);
        assert_eq!(store.candidate_count().await, 1);
    }

    #[tokio::test]
    async fn test_signature_cache_is_reused_and_purged() {
        let store = MemoryStore::new();
        for title in ["Family", "Health", "Curiosity"] {
            store
                .insert_personal_value(
                    Uuid::new_v4(),
                    PersonalValueFields {
                        title: title.to_string(),
                        value_level: "major".to_string(),
                        life_domain: None,
                    },
                )
                .await;
        }
        let manager = manager(&store);
        let cancel = ScanCancellation::new();

        let first = manager
            .scan_entity_types(&[EntityType::PersonalValue], &cancel, None)
            .await
            .unwrap();
        assert_eq!(first.kinds[0].signature_cache_hits, 0);
        assert_eq!(store.signature_count().await, 3);

        let second = manager
            .scan_entity_types(&[EntityType::PersonalValue], &cancel, None)
            .await
            .unwrap();
        assert_eq!(second.kinds[0].signature_cache_hits, 3);
        assert_eq!(first.candidates, second.candidates);

        assert_eq!(manager.purge_stale_signatures(None).await.unwrap(), 0);
        assert_eq!(
            manager.purge_stale_signatures(Some(Duration::seconds(-60))).await.unwrap(),
            3
        );
        assert_eq!(store.signature_count().await, 0);
    }

    #[tokio::test]
    async fn test_action_check_only_looks_inside_the_window() {
        let store = MemoryStore::new();
        let at = |h, m| Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap();
        let nearby = Uuid::new_v4();
        store
            .insert_action(
                nearby,
                ActionFields {
                    title: "Morning run".to_string(),
                    description: None,
                    log_time: at(7, 2),
                },
            )
            .await;
        store
            .insert_action(
                Uuid::new_v4(),
                ActionFields {
                    title: "Morning run".to_string(),
                    description: None,
                    log_time: at(12, 2),
                },
            )
            .await;
        let manager = manager(&store);

        let found = manager
            .check_action_duplicate(&ActionFields {
                title: "Morning Run".to_string(),
                description: None,
                log_time: at(7, 4),
            })
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_id, nearby);
        assert!(matches!(found[0].severity, Severity::High | Severity::Exact));
    }

    #[tokio::test]
    async fn test_action_check_with_unusable_window_errors_instead_of_panicking() {
        let store = MemoryStore::new();
        let config = DetectionConfig {
            action_window_minutes: i64::MAX,
            ..DetectionConfig::default()
        };
        let manager = DeduplicationManager::new(store.clone(), store.clone(), config).unwrap();
        let fields = ActionFields {
            title: "Morning run".to_string(),
            description: None,
            log_time: Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap(),
        };

        let err = manager.check_action_duplicate(&fields).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DetectionError>(), Some(DetectionError::Config(_))));

        let config = DetectionConfig {
            action_window_minutes: 60,
            ..DetectionConfig::default()
        };
        let manager = DeduplicationManager::new(store.clone(), store.clone(), config).unwrap();
        let edge = ActionFields {
            log_time: chrono::DateTime::<Utc>::MAX_UTC,
            ..fields
        };
        let err = manager.check_action_duplicate(&edge).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DetectionError>(), Some(DetectionError::Config(_))));
    }

    #[tokio::test]
    async fn test_exact_term_match_blocks_submission() {
        let store = MemoryStore::new();
        store
            .insert_goal_term(
                Uuid::new_v4(),
                GoalTermFields {
                    term_number: 7,
                    theme: Some("Health focus".to_string()),
                },
            )
            .await;
        let manager = manager(&store);

        let same_number = manager
            .check_goal_term_duplicate(&GoalTermFields {
                term_number: 7,
                theme: Some("Career".to_string()),
            })
            .await
            .unwrap();
        assert!(DeduplicationManager::<MemoryStore, MemoryStore>::blocks_submission(&same_number));

        let same_theme = manager
            .check_goal_term_duplicate(&GoalTermFields {
                term_number: 8,
                theme: Some("Health focus".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(same_theme.len(), 1);
        assert_eq!(same_theme[0].severity, Severity::Low);
        assert!(!DeduplicationManager::<MemoryStore, MemoryStore>::blocks_submission(&same_theme));
    }

    #[tokio::test]
    async fn test_goal_check_skips_goals_without_context() {
        let store = MemoryStore::new();
        let existing = Uuid::new_v4();
        store
            .insert_goal(GoalPoolEntry {
                id: existing,
                expectation_id: Some(Uuid::new_v4()),
                context: Some(goal_context("Cycle 500 km", 500.0, &[2])),
            })
            .await;
        store
            .insert_goal(GoalPoolEntry {
                id: Uuid::new_v4(),
                expectation_id: None,
                context: None,
            })
            .await;
        let manager = manager(&store);

        let found = manager
            .check_goal_duplicate(&goal_context("Cycle 500 km", 480.0, &[2]))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_id, existing);
        // title 1.0, terms 1.0, targets within 10% -> 0.4 + 0.3 + 0.24
        assert!((found[0].similarity - 0.94).abs() < 1e-9);
        assert_eq!(found[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn test_resolution_rules() {
        let store = MemoryStore::new();
        store.insert_measure(Uuid::new_v4(), measure("kg", "mass")).await;
        store.insert_measure(Uuid::new_v4(), measure("kg", "mass")).await;
        let manager = manager(&store);
        manager.scan_for_duplicates(&ScanCancellation::new()).await.unwrap();
        let id = manager.get_pending_duplicates().await.unwrap()[0].id;

        let err = manager
            .resolve_duplicate(id, DuplicateStatus::Pending, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            detection_error(&err),
            Some(DetectionError::InvalidTransition { .. })
        ));

        manager.mark_reviewed(id).await.unwrap();
        let reviewed = store.get_candidate(id).await.unwrap().unwrap();
        assert!(reviewed.reviewed_at.is_some());
        assert_eq!(reviewed.status, DuplicateStatus::Pending);

        manager
            .resolve_duplicate(id, DuplicateStatus::Merged, Some(Resolution::KeepFirst), Some("same unit".into()))
            .await
            .unwrap();
        let err = manager
            .resolve_duplicate(id, DuplicateStatus::Resolved, None, None)
            .await
            .unwrap_err();
        assert_eq!(
            detection_error(&err),
            Some(&DetectionError::InvalidTransition {
                from: DuplicateStatus::Merged,
                to: DuplicateStatus::Resolved,
            })
        );

        let missing = Uuid::new_v4();
        let err = manager
            .resolve_duplicate(missing, DuplicateStatus::Ignored, None, None)
            .await
            .unwrap_err();
        assert_eq!(detection_error(&err), Some(&DetectionError::CandidateNotFound(missing)));
    }

    #[tokio::test]
    async fn test_scanning_a_kind_without_detector_fails_fast() {
        let store = MemoryStore::new();
        let manager = manager(&store);
        let err = manager
            .scan_entity_types(&[EntityType::Milestone], &ScanCancellation::new(), None)
            .await
            .unwrap_err();
        assert_eq!(
            detection_error(&err),
            Some(&DetectionError::NoDetector(EntityType::Milestone))
        );
    }
}
