// src/utils/config.rs
use chrono::Duration;
use log::info;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use crate::error::DetectionError;
use crate::lsh::{SignatureEngine, DEFAULT_NUM_HASHES, DEFAULT_SEED, DEFAULT_SHINGLE_SIZE};
use crate::matching::action::DEFAULT_BUCKET_MINUTES;
use crate::models::core::EntityType;
use crate::severity::{SimilarityThresholds, ThresholdPreset};

pub const DEFAULT_ACTION_WINDOW_MINUTES: i64 = 60;
/// One year. Larger windows cannot be applied to a log time safely.
pub const MAX_ACTION_WINDOW_MINUTES: i64 = 525_600;

/// Engine settings read from `DEDUP_*` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    pub num_hashes: usize,
    pub shingle_size: usize,
    pub hash_seed: u64,
    /// Proactive action checks compare against actions within this many
    /// minutes either side of the new log time.
    pub action_window_minutes: i64,
    pub action_bucket_minutes: u32,
    pub use_signature_cache: bool,
    /// Per-kind preset overrides.
    pub presets: HashMap<EntityType, ThresholdPreset>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            num_hashes: DEFAULT_NUM_HASHES,
            shingle_size: DEFAULT_SHINGLE_SIZE,
            hash_seed: DEFAULT_SEED,
            action_window_minutes: DEFAULT_ACTION_WINDOW_MINUTES,
            action_bucket_minutes: DEFAULT_BUCKET_MINUTES,
            use_signature_cache: true,
            presets: HashMap::new(),
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T, DetectionError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| DetectionError::Config(format!("{} has invalid value '{}'", name, raw))),
        _ => Ok(default),
    }
}

fn require_window(name: &str, minutes: i64) -> Result<i64, DetectionError> {
    let minutes = require_positive(name, minutes)?;
    if minutes > MAX_ACTION_WINDOW_MINUTES || Duration::try_minutes(minutes).is_none() {
        return Err(DetectionError::Config(format!(
            "{} must be at most {} minutes, got {}",
            name, MAX_ACTION_WINDOW_MINUTES, minutes
        )));
    }
    Ok(minutes)
}

fn require_positive<T: PartialOrd + Default>(name: &str, value: T) -> Result<T, DetectionError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(DetectionError::Config(format!("{} must be positive", name)))
    }
}

impl DetectionConfig {
    pub fn from_env() -> Result<Self, DetectionError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable lookup. Invalid values fail
    /// instead of falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DetectionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let num_hashes = require_positive(
            "DEDUP_NUM_HASHES",
            parse_var(&lookup, "DEDUP_NUM_HASHES", DEFAULT_NUM_HASHES)?,
        )?;
        let shingle_size = require_positive(
            "DEDUP_SHINGLE_SIZE",
            parse_var(&lookup, "DEDUP_SHINGLE_SIZE", DEFAULT_SHINGLE_SIZE)?,
        )?;
        let hash_seed = parse_var(&lookup, "DEDUP_HASH_SEED", DEFAULT_SEED)?;
        let action_window_minutes = require_window(
            "DEDUP_ACTION_WINDOW_MINUTES",
            parse_var(&lookup, "DEDUP_ACTION_WINDOW_MINUTES", DEFAULT_ACTION_WINDOW_MINUTES)?,
        )?;
        let action_bucket_minutes = require_positive(
            "DEDUP_ACTION_BUCKET_MINUTES",
            parse_var(&lookup, "DEDUP_ACTION_BUCKET_MINUTES", DEFAULT_BUCKET_MINUTES)?,
        )?;
        let use_signature_cache = parse_var(&lookup, "DEDUP_USE_SIGNATURE_CACHE", true)?;

        let mut presets = HashMap::new();
        for kind in EntityType::SCAN_ORDER {
            let name = format!("DEDUP_PRESET_{}", kind.as_str().to_uppercase());
            if let Some(raw) = lookup(&name) {
                presets.insert(kind, raw.parse::<ThresholdPreset>()?);
            }
        }

        Ok(Self {
            num_hashes,
            shingle_size,
            hash_seed,
            action_window_minutes,
            action_bucket_minutes,
            use_signature_cache,
            presets,
        })
    }

    pub fn preset_for(&self, entity_type: EntityType) -> ThresholdPreset {
        self.presets
            .get(&entity_type)
            .copied()
            .unwrap_or_else(|| ThresholdPreset::for_entity_type(entity_type))
    }

    pub fn thresholds_for(&self, entity_type: EntityType) -> SimilarityThresholds {
        self.preset_for(entity_type).thresholds()
    }

    pub fn build_engine(&self) -> Result<SignatureEngine, DetectionError> {
        SignatureEngine::new(self.num_hashes, self.hash_seed, self.shingle_size)
    }

    pub fn log_config(&self) {
        info!(
            "🔧 MinHash: {} hash functions, shingle size {}, seed {}",
            self.num_hashes, self.shingle_size, self.hash_seed
        );
        info!(
            "   Actions: ±{} min check window, {} min time buckets",
            self.action_window_minutes, self.action_bucket_minutes
        );
        if self.use_signature_cache {
            info!("💾 Signature cache ENABLED");
        } else {
            info!("💾 Signature cache DISABLED - signatures recomputed on every scan");
        }
        for kind in EntityType::SCAN_ORDER {
            let preset = self.preset_for(kind);
            let marker = if self.presets.contains_key(&kind) { " (override)" } else { "" };
            info!("   {} thresholds: {}{}", kind, preset, marker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = DetectionConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, DetectionConfig::default());
        assert_eq!(config.preset_for(EntityType::Measure), ThresholdPreset::Strict);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = DetectionConfig::from_lookup(lookup_from(&[
            ("DEDUP_NUM_HASHES", "128"),
            ("DEDUP_USE_SIGNATURE_CACHE", "false"),
            ("DEDUP_PRESET_PERSONAL_VALUE", "relaxed"),
        ]))
        .unwrap();
        assert_eq!(config.num_hashes, 128);
        assert!(!config.use_signature_cache);
        assert_eq!(config.thresholds_for(EntityType::PersonalValue), SimilarityThresholds::RELAXED);
        assert_eq!(config.build_engine().unwrap().num_hashes(), 128);
    }

    #[test]
    fn test_invalid_values_fail_fast() {
        let err = DetectionConfig::from_lookup(lookup_from(&[("DEDUP_NUM_HASHES", "lots")])).unwrap_err();
        assert!(matches!(err, DetectionError::Config(_)));

        let err = DetectionConfig::from_lookup(lookup_from(&[("DEDUP_SHINGLE_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, DetectionError::Config(_)));

        let err = DetectionConfig::from_lookup(lookup_from(&[("DEDUP_PRESET_GOAL", "loose")])).unwrap_err();
        assert_eq!(err, DetectionError::UnknownPreset("loose".to_string()));
    }

    #[test]
    fn test_oversized_action_window_is_rejected() {
        let huge = i64::MAX.to_string();
        let err = DetectionConfig::from_lookup(lookup_from(&[("DEDUP_ACTION_WINDOW_MINUTES", huge.as_str())]))
            .unwrap_err();
        assert!(matches!(err, DetectionError::Config(_)));

        let err = DetectionConfig::from_lookup(lookup_from(&[("DEDUP_ACTION_WINDOW_MINUTES", "525601")])).unwrap_err();
        assert!(matches!(err, DetectionError::Config(_)));

        let config = DetectionConfig::from_lookup(lookup_from(&[("DEDUP_ACTION_WINDOW_MINUTES", "525600")])).unwrap();
        assert_eq!(config.action_window_minutes, MAX_ACTION_WINDOW_MINUTES);
    }
}
