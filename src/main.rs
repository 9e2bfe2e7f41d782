// src/main.rs - Command line entry point for duplicate scans and review
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use dedupe_lib::matching::{DeduplicationManager, PgDuplicateStore};
use dedupe_lib::models::candidates::{DuplicateStatus, Resolution};
use dedupe_lib::models::core::EntityType;
use dedupe_lib::utils::cancellation::ScanCancellation;
use dedupe_lib::utils::config::DetectionConfig;
use dedupe_lib::utils::db_connect::{connect, get_pool_status};
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::progress_callback::ProgressCallback;

#[derive(Parser)]
#[command(author, version, about = "Near-duplicate detection for goal-tracking records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the candidate and signature cache tables
    InitSchema,
    /// Scan stored records for near-duplicates and persist the candidates
    Scan {
        /// Comma separated kinds (measure, personal_value, goal_term, action, goal). Defaults to all.
        #[arg(long, value_delimiter = ',')]
        kinds: Vec<String>,
    },
    /// List candidates awaiting review, most similar first
    Pending {
        #[arg(long)]
        json: bool,
    },
    /// Resolve a pending candidate
    Resolve {
        id: Uuid,
        /// merged, ignored or resolved
        #[arg(long)]
        status: String,
        /// keep_first, keep_second, keep_both or merged
        #[arg(long)]
        resolution: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Stamp a pending candidate as reviewed without resolving it
    Review { id: Uuid },
    /// Drop cached signatures from other algorithm versions
    PurgeSignatures {
        /// Also drop entries computed more than this many days ago
        #[arg(long)]
        older_than_days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let cli = Cli::parse();

    let config = DetectionConfig::from_env().context("Invalid duplicate detection configuration")?;
    config.log_config();

    let pool = connect().await.context("Failed to connect to database")?;
    let store = PgDuplicateStore::new(pool.clone());
    let manager = DeduplicationManager::new(store.clone(), store.clone(), config)?;

    match cli.command {
        Command::InitSchema => store.ensure_schema().await?,
        Command::Scan { kinds } => {
            let kinds = parse_kinds(&kinds)?;
            run_scan(&manager, &kinds).await?;
        }
        Command::Pending { json } => {
            let pending = manager.get_pending_duplicates().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pending)?);
            } else if pending.is_empty() {
                println!("No pending duplicate candidates.");
            } else {
                for record in &pending {
                    println!(
                        "{}  {:<15} {:>5.1}%  {:<8} {} ~ {}",
                        record.id,
                        record.entity_type.as_str(),
                        record.similarity * 100.0,
                        record.severity.as_str(),
                        record.entity1_id,
                        record.entity2_id
                    );
                }
                println!("{} pending candidates", pending.len());
            }
        }
        Command::Resolve {
            id,
            status,
            resolution,
            notes,
        } => {
            let status: DuplicateStatus = status.parse()?;
            let resolution = resolution.map(|r| r.parse::<Resolution>()).transpose()?;
            manager.resolve_duplicate(id, status, resolution, notes).await?;
            println!("Candidate {} is now {}", id, status);
        }
        Command::Review { id } => {
            manager.mark_reviewed(id).await?;
            println!("Candidate {} marked reviewed", id);
        }
        Command::PurgeSignatures { older_than_days } => {
            let older_than = older_than_days
                .map(|days| {
                    chrono::Duration::try_days(days)
                        .with_context(|| format!("--older-than-days {} is out of range", days))
                })
                .transpose()?;
            let removed = manager.purge_stale_signatures(older_than).await?;
            println!("Removed {} cached signatures", removed);
        }
    }

    let (total, idle, in_use) = get_pool_status(&pool);
    info!(
        "DB pool status at exit: {} total, {} idle, {} in use",
        total, idle, in_use
    );
    Ok(())
}

fn parse_kinds(raw: &[String]) -> Result<Vec<EntityType>> {
    if raw.is_empty() {
        return Ok(EntityType::SCAN_ORDER.to_vec());
    }
    raw.iter()
        .map(|k| k.trim().parse::<EntityType>().map_err(anyhow::Error::from))
        .collect()
}

async fn run_scan(
    manager: &DeduplicationManager<PgDuplicateStore, PgDuplicateStore>,
    kinds: &[EntityType],
) -> Result<()> {
    let cancel = ScanCancellation::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received; stopping after the current entity kind");
            handle.cancel();
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("Invalid progress template")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let bar = spinner.clone();
    let progress: ProgressCallback = Arc::new(move |phase, detail| match detail {
        Some(detail) => bar.set_message(format!("{}: {}", phase, detail)),
        None => bar.set_message(phase),
    });

    let result = manager.scan_entity_types(kinds, &cancel, Some(progress)).await;
    spinner.finish_and_clear();
    let result = result?;

    for stats in &result.kinds {
        println!(
            "{:<15} {:>6} records {:>9} pairs {:>5} candidates {:>4} failures  {:.2}s",
            stats.entity_type.as_str(),
            stats.entities_scanned,
            stats.pairs_compared,
            stats.candidates_found,
            stats.pair_failures,
            stats.elapsed_secs
        );
    }
    println!(
        "Scan {}: {} candidates, {} persisted ({} inserted, {} updated), {} already reviewed, {} failed{}",
        result.scan_id,
        result.total_candidates(),
        result.persistence.persisted(),
        result.persistence.inserted,
        result.persistence.updated,
        result.persistence.skipped_terminal,
        result.persistence.failed.len(),
        if result.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}
