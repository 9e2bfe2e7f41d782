// src/matching/db.rs - PostgreSQL entity source, candidate store and signature cache
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use tokio_postgres::{IsolationLevel, Row};
use uuid::Uuid;

use crate::error::DetectionError;
use crate::lsh::Signature;
use crate::models::candidates::{
    canonical_pair, DuplicateCandidateRecord, DuplicateStatus, NewDuplicateCandidate, Resolution, ResolutionUpdate,
    Severity,
};
use crate::models::core::{
    ActionFields, EntityType, GoalContext, GoalPoolEntry, GoalTermFields, MeasureFields, MeasureTarget,
    PersonalValueFields, Stored,
};
use crate::models::stats_models::{UpsertFailure, UpsertReport};
use crate::store::{CachedSignature, CandidateStore, EntityPool, EntitySource, SignatureCacheStore};
use crate::utils::db_connect::PgPool;

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS duplicate_candidates (
        id UUID PRIMARY KEY,
        entity_type TEXT NOT NULL,
        entity1_id UUID NOT NULL,
        entity2_id UUID NOT NULL,
        similarity DOUBLE PRECISION NOT NULL CHECK (similarity >= 0 AND similarity <= 1),
        severity TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        reviewed_at TIMESTAMPTZ,
        resolved_at TIMESTAMPTZ,
        resolution TEXT,
        resolution_notes TEXT,
        CONSTRAINT duplicate_candidates_pair_key UNIQUE (entity_type, entity1_id, entity2_id),
        CONSTRAINT duplicate_candidates_pair_order CHECK (entity1_id < entity2_id)
    );
    CREATE INDEX IF NOT EXISTS idx_duplicate_candidates_pending
        ON duplicate_candidates (status, similarity DESC);
    CREATE TABLE IF NOT EXISTS entity_signatures (
        entity_type TEXT NOT NULL,
        entity_id UUID NOT NULL,
        signature BYTEA NOT NULL,
        source_text_hash TEXT NOT NULL,
        algorithm_version TEXT NOT NULL,
        computed_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (entity_type, entity_id)
    );
";

// Terminal rows fail the DO UPDATE condition and return nothing.
const UPSERT_CANDIDATE_SQL: &str = "
    INSERT INTO duplicate_candidates
        (id, entity_type, entity1_id, entity2_id, similarity, severity, status, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, 'pending', CURRENT_TIMESTAMP)
    ON CONFLICT (entity_type, entity1_id, entity2_id) DO UPDATE
        SET similarity = EXCLUDED.similarity, severity = EXCLUDED.severity
        WHERE duplicate_candidates.status = 'pending'
    RETURNING (xmax = 0) AS inserted";

const CANDIDATE_COLUMNS: &str = "id, entity_type, entity1_id, entity2_id, similarity, severity, status,
    created_at, reviewed_at, resolved_at, resolution, resolution_notes";

/// Entity tables, candidate records and the signature cache in one database.
#[derive(Clone)]
pub struct PgDuplicateStore {
    pool: PgPool,
}

impl PgDuplicateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the candidate and signature tables if they are missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for ensure_schema")?;
        conn.batch_execute(SCHEMA_SQL)
            .await
            .context("Failed to create duplicate detection tables")?;
        info!("Duplicate detection schema is in place");
        Ok(())
    }
}

fn parse_text<T>(row: &Row, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = DetectionError>,
{
    let raw: String = row.get(column);
    Ok(raw.parse::<T>()?)
}

fn row_to_record(row: &Row) -> Result<DuplicateCandidateRecord> {
    let resolution: Option<String> = row.get("resolution");
    Ok(DuplicateCandidateRecord {
        id: row.get("id"),
        entity_type: parse_text::<EntityType>(row, "entity_type")?,
        entity1_id: row.get("entity1_id"),
        entity2_id: row.get("entity2_id"),
        similarity: row.get("similarity"),
        severity: parse_text::<Severity>(row, "severity")?,
        status: parse_text::<DuplicateStatus>(row, "status")?,
        created_at: row.get("created_at"),
        reviewed_at: row.get("reviewed_at"),
        resolved_at: row.get("resolved_at"),
        resolution: resolution.map(|r| r.parse::<Resolution>()).transpose()?,
        notes: row.get("resolution_notes"),
    })
}

impl EntitySource for PgDuplicateStore {
    /// Loads one kind inside a REPEATABLE READ, READ ONLY transaction so the
    /// whole pool (goal joins included) comes from one snapshot.
    async fn fetch_pool(&self, entity_type: EntityType) -> Result<EntityPool> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for fetch_pool")?;
        let tx = conn
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await
            .context("Failed to start snapshot transaction")?;

        let pool = match entity_type {
            EntityType::Action => {
                let rows = tx
                    .query(
                        "SELECT id, title, detailed_description, log_time FROM actions ORDER BY log_time, id",
                        &[],
                    )
                    .await
                    .context("Failed to load actions")?;
                EntityPool::Actions(rows.iter().map(action_from_row).collect())
            }
            EntityType::Measure => {
                let rows = tx
                    .query("SELECT id, unit, measure_type FROM measures ORDER BY id", &[])
                    .await
                    .context("Failed to load measures")?;
                EntityPool::Measures(
                    rows.iter()
                        .map(|row| {
                            Stored::new(
                                row.get("id"),
                                MeasureFields {
                                    unit: row.get("unit"),
                                    unit_type: row.get("measure_type"),
                                },
                            )
                        })
                        .collect(),
                )
            }
            EntityType::PersonalValue => {
                let rows = tx
                    .query(
                        "SELECT id, title, value_level, life_domain FROM personal_values ORDER BY id",
                        &[],
                    )
                    .await
                    .context("Failed to load personal values")?;
                EntityPool::PersonalValues(
                    rows.iter()
                        .map(|row| {
                            Stored::new(
                                row.get("id"),
                                PersonalValueFields {
                                    title: row.get("title"),
                                    value_level: row.get("value_level"),
                                    life_domain: row.get("life_domain"),
                                },
                            )
                        })
                        .collect(),
                )
            }
            EntityType::GoalTerm => {
                let rows = tx
                    .query("SELECT id, term_number, theme FROM goal_terms ORDER BY term_number, id", &[])
                    .await
                    .context("Failed to load goal terms")?;
                EntityPool::GoalTerms(
                    rows.iter()
                        .map(|row| {
                            Stored::new(
                                row.get("id"),
                                GoalTermFields {
                                    term_number: row.get("term_number"),
                                    theme: row.get("theme"),
                                },
                            )
                        })
                        .collect(),
                )
            }
            EntityType::Goal => EntityPool::Goals(load_goal_entries(&tx).await?),
            other => return Err(DetectionError::NoDetector(other).into()),
        };

        tx.commit().await.context("Failed to close snapshot transaction")?;
        debug!("Loaded {} {} records", pool.len(), entity_type);
        Ok(pool)
    }

    async fn fetch_actions_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Stored<ActionFields>>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for fetch_actions_between")?;
        let rows = conn
            .query(
                "SELECT id, title, detailed_description, log_time FROM actions
                 WHERE log_time BETWEEN $1 AND $2 ORDER BY log_time, id",
                &[&start, &end],
            )
            .await
            .context("Failed to load actions in time window")?;
        Ok(rows.iter().map(action_from_row).collect())
    }
}

fn action_from_row(row: &Row) -> Stored<ActionFields> {
    Stored::new(
        row.get("id"),
        ActionFields {
            title: row.get("title"),
            description: row.get("detailed_description"),
            log_time: row.get("log_time"),
        },
    )
}

/// Goals joined with their expectation, measurable targets and term numbers.
async fn load_goal_entries(tx: &tokio_postgres::Transaction<'_>) -> Result<Vec<GoalPoolEntry>> {
    let goal_rows = tx
        .query(
            "SELECT g.id, g.expectation_id, e.id IS NOT NULL AS has_expectation,
                    e.title, e.detailed_description
             FROM goals g
             LEFT JOIN expectations e ON e.id = g.expectation_id
             ORDER BY g.id",
            &[],
        )
        .await
        .context("Failed to load goals")?;

    let goal_ids: Vec<Uuid> = goal_rows.iter().map(|r| r.get("id")).collect();
    let expectation_ids: Vec<Uuid> = goal_rows
        .iter()
        .filter_map(|r| r.get::<_, Option<Uuid>>("expectation_id"))
        .collect();

    let target_rows = tx
        .query(
            "SELECT em.expectation_id, m.unit, em.target_value
             FROM expectation_measures em
             JOIN measures m ON m.id = em.measure_id
             WHERE em.expectation_id = ANY($1)",
            &[&expectation_ids],
        )
        .await
        .context("Failed to load expectation measure targets")?;
    let mut targets: HashMap<Uuid, Vec<MeasureTarget>> = HashMap::new();
    for row in &target_rows {
        let value: Option<f64> = row.get("target_value");
        if let Some(target_value) = value {
            targets
                .entry(row.get("expectation_id"))
                .or_default()
                .push(MeasureTarget {
                    unit: row.get("unit"),
                    target_value,
                });
        }
    }

    let term_rows = tx
        .query(
            "SELECT tga.goal_id, gt.term_number
             FROM term_goal_assignments tga
             JOIN goal_terms gt ON gt.id = tga.term_id
             WHERE tga.goal_id = ANY($1)",
            &[&goal_ids],
        )
        .await
        .context("Failed to load goal term assignments")?;
    let mut terms: HashMap<Uuid, BTreeSet<i32>> = HashMap::new();
    for row in &term_rows {
        terms
            .entry(row.get("goal_id"))
            .or_default()
            .insert(row.get("term_number"));
    }

    let entries = goal_rows
        .iter()
        .map(|row| {
            let id: Uuid = row.get("id");
            let expectation_id: Option<Uuid> = row.get("expectation_id");
            let has_expectation: bool = row.get("has_expectation");
            let context = match expectation_id {
                Some(expectation_id) if has_expectation => Some(GoalContext {
                    title: row.get::<_, Option<String>>("title").unwrap_or_default(),
                    description: row.get("detailed_description"),
                    targets: targets.remove(&expectation_id).unwrap_or_default(),
                    term_numbers: terms.remove(&id).unwrap_or_default(),
                }),
                _ => None,
            };
            GoalPoolEntry {
                id,
                expectation_id,
                context,
            }
        })
        .collect();
    Ok(entries)
}

impl CandidateStore for PgDuplicateStore {
    /// One transaction for the whole batch with a savepoint per candidate: a
    /// failing row rolls back alone and the rest still commit.
    async fn upsert_candidates(&self, candidates: &[NewDuplicateCandidate]) -> Result<UpsertReport> {
        let mut report = UpsertReport::default();
        if candidates.is_empty() {
            return Ok(report);
        }

        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for upsert_candidates")?;
        let mut tx = conn.transaction().await.context("Failed to start candidate transaction")?;

        for candidate in candidates {
            let (e1, e2) = canonical_pair(candidate.entity1_id, candidate.entity2_id);
            let sp = tx
                .savepoint("candidate_upsert")
                .await
                .context("Failed to create savepoint")?;

            let outcome = sp
                .query_opt(
                    UPSERT_CANDIDATE_SQL,
                    &[
                        &Uuid::new_v4(),
                        &candidate.entity_type.as_str(),
                        &e1,
                        &e2,
                        &candidate.similarity,
                        &candidate.severity.as_str(),
                    ],
                )
                .await;

            match outcome {
                Ok(Some(row)) => {
                    let inserted: bool = row.get("inserted");
                    sp.commit().await.context("Failed to release savepoint")?;
                    if inserted {
                        report.inserted += 1;
                    } else {
                        report.updated += 1;
                    }
                }
                Ok(None) => {
                    sp.commit().await.context("Failed to release savepoint")?;
                    report.skipped_terminal += 1;
                }
                Err(e) => {
                    warn!(
                        "[{}] Candidate upsert failed for ({}, {}): {}",
                        candidate.entity_type, e1, e2, e
                    );
                    sp.rollback().await.context("Failed to roll back savepoint")?;
                    report.failed.push(UpsertFailure {
                        entity_type: candidate.entity_type,
                        entity1_id: e1,
                        entity2_id: e2,
                        error: e.to_string(),
                    });
                }
            }
        }

        tx.commit().await.context("Failed to commit candidate transaction")?;
        info!(
            "Persisted candidates: {} inserted, {} updated, {} already reviewed, {} failed",
            report.inserted,
            report.updated,
            report.skipped_terminal,
            report.failed.len()
        );
        Ok(report)
    }

    async fn get_candidate(&self, id: Uuid) -> Result<Option<DuplicateCandidateRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for get_candidate")?;
        let row = conn
            .query_opt(
                &format!("SELECT {} FROM duplicate_candidates WHERE id = $1", CANDIDATE_COLUMNS),
                &[&id],
            )
            .await
            .context(format!("Failed to load duplicate candidate {}", id))?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn apply_resolution(&self, id: Uuid, update: &ResolutionUpdate) -> Result<bool> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for apply_resolution")?;
        let resolution = update.resolution.map(|r| r.as_str());
        let changed = conn
            .execute(
                "UPDATE duplicate_candidates
                 SET status = $2, resolution = $3, resolution_notes = $4, resolved_at = $5
                 WHERE id = $1 AND status = 'pending'",
                &[
                    &id,
                    &update.status.as_str(),
                    &resolution,
                    &update.notes,
                    &update.resolved_at,
                ],
            )
            .await
            .context(format!("Failed to resolve duplicate candidate {}", id))?;
        Ok(changed > 0)
    }

    async fn mark_reviewed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for mark_reviewed")?;
        let changed = conn
            .execute(
                "UPDATE duplicate_candidates SET reviewed_at = $2 WHERE id = $1 AND status = 'pending'",
                &[&id, &at],
            )
            .await
            .context(format!("Failed to mark duplicate candidate {} reviewed", id))?;
        Ok(changed > 0)
    }

    async fn pending_candidates(&self) -> Result<Vec<DuplicateCandidateRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for pending_candidates")?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM duplicate_candidates WHERE status = 'pending'
                     ORDER BY similarity DESC, created_at ASC",
                    CANDIDATE_COLUMNS
                ),
                &[],
            )
            .await
            .context("Failed to load pending duplicate candidates")?;
        rows.iter().map(row_to_record).collect()
    }
}

impl SignatureCacheStore for PgDuplicateStore {
    async fn get_signatures(&self, entity_type: EntityType, ids: &[Uuid]) -> Result<HashMap<Uuid, CachedSignature>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for get_signatures")?;
        let rows = conn
            .query(
                "SELECT entity_id, signature, source_text_hash, algorithm_version, computed_at
                 FROM entity_signatures
                 WHERE entity_type = $1 AND entity_id = ANY($2)",
                &[&entity_type.as_str(), &ids],
            )
            .await
            .context("Failed to load cached signatures")?;

        let mut cached = HashMap::with_capacity(rows.len());
        for row in &rows {
            let entity_id: Uuid = row.get("entity_id");
            let bytes: Vec<u8> = row.get("signature");
            match Signature::from_bytes(&bytes) {
                Ok(signature) => {
                    cached.insert(
                        entity_id,
                        CachedSignature {
                            entity_type,
                            entity_id,
                            signature,
                            source_text_hash: row.get("source_text_hash"),
                            algorithm_version: row.get("algorithm_version"),
                            computed_at: row.get("computed_at"),
                        },
                    );
                }
                Err(e) => warn!("Ignoring cached signature for {} {}: {}", entity_type, entity_id, e),
            }
        }
        Ok(cached)
    }

    async fn upsert_signatures(&self, entries: &[CachedSignature]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for upsert_signatures")?;
        let tx = conn.transaction().await.context("Failed to start signature transaction")?;
        let statement = tx
            .prepare(
                "INSERT INTO entity_signatures
                    (entity_type, entity_id, signature, source_text_hash, algorithm_version, computed_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (entity_type, entity_id) DO UPDATE
                    SET signature = EXCLUDED.signature,
                        source_text_hash = EXCLUDED.source_text_hash,
                        algorithm_version = EXCLUDED.algorithm_version,
                        computed_at = EXCLUDED.computed_at",
            )
            .await
            .context("Failed to prepare signature upsert")?;

        for entry in entries {
            let bytes = entry.signature.to_bytes();
            tx.execute(
                &statement,
                &[
                    &entry.entity_type.as_str(),
                    &entry.entity_id,
                    &bytes,
                    &entry.source_text_hash,
                    &entry.algorithm_version,
                    &entry.computed_at,
                ],
            )
            .await
            .context(format!("Failed to cache signature for {}", entry.entity_id))?;
        }

        tx.commit().await.context("Failed to commit signature transaction")?;
        debug!("Cached {} signatures", entries.len());
        Ok(entries.len())
    }

    async fn purge_signatures(&self, current_version: &str, computed_before: Option<DateTime<Utc>>) -> Result<u64> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for purge_signatures")?;
        let removed = conn
            .execute(
                "DELETE FROM entity_signatures
                 WHERE algorithm_version <> $1
                    OR ($2::timestamptz IS NOT NULL AND computed_at < $2)",
                &[&current_version, &computed_before],
            )
            .await
            .context("Failed to purge cached signatures")?;
        Ok(removed)
    }
}
