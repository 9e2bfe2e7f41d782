// src/utils/logging.rs - Logging helpers for per-kind duplicate scans
use log::{debug, info, warn};
use std::time::Instant;

use crate::models::core::EntityType;
use crate::models::stats_models::EntityScanStats;

#[derive(Clone)]
pub struct DetectionLogger {
    kind_name: &'static str,
    kind_emoji: &'static str,
    start_time: Instant,
}

impl DetectionLogger {
    pub fn new(entity_type: EntityType) -> Self {
        let (kind_name, kind_emoji) = match entity_type {
            EntityType::Action => ("ACTION", "🏃"),
            EntityType::Measure => ("MEASURE", "📏"),
            EntityType::PersonalValue => ("VALUE", "💎"),
            EntityType::GoalTerm => ("TERM", "📅"),
            EntityType::Goal => ("GOAL", "🎯"),
            _ => ("OTHER", "⚙️"),
        };

        Self {
            kind_name,
            kind_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, scan_id: &str) {
        info!(
            "[{}] {} 🚀 Starting {} duplicate scan (scan ID: {})",
            self.kind_name,
            self.kind_emoji,
            self.kind_name.to_lowercase(),
            scan_id
        );
    }

    pub fn log_data_loaded(&self, count: usize) {
        info!(
            "[{}] {} 📊 Loaded {} records from one snapshot",
            self.kind_name, self.kind_emoji, count
        );
    }

    pub fn log_pair_generation(&self, total_pairs: usize) {
        info!(
            "[{}] {} 📈 Pairs to compare: {}",
            self.kind_name, self.kind_emoji, total_pairs
        );
    }

    pub fn log_cache_results(&self, cache_hits: usize, cache_misses: usize) {
        let total = cache_hits + cache_misses;
        if total > 0 {
            let hit_rate = (cache_hits as f64 / total as f64) * 100.0;
            info!(
                "[{}] {} 💾 Signature cache: {} hits, {} misses ({:.1}% hit rate)",
                self.kind_name, self.kind_emoji, cache_hits, cache_misses, hit_rate
            );
        }
    }

    pub fn log_missing_context(&self, entity_id: &str, affected_pairs: usize) {
        warn!(
            "[{}] {} ⚠️  No joined context for {}; skipping {} pairs",
            self.kind_name, self.kind_emoji, entity_id, affected_pairs
        );
    }

    pub fn log_candidate(&self, entity1: &str, entity2: &str, similarity: f64, severity: &str) {
        debug!(
            "[{}] {} 🔗 {} ~ {} ({:.3}, {})",
            self.kind_name, self.kind_emoji, entity1, entity2, similarity, severity
        );
    }

    pub fn log_completion(&self, stats: &EntityScanStats) {
        let elapsed = self.start_time.elapsed();
        info!(
            "[{}] {} ✅ Scan complete in {:.2?}: {} records, {} pairs compared, {} candidates, {} pair failures",
            self.kind_name,
            self.kind_emoji,
            elapsed,
            stats.entities_scanned,
            stats.pairs_compared,
            stats.candidates_found,
            stats.pair_failures
        );
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}
