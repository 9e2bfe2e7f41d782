// src/models/mod.rs
pub mod candidates;
pub mod core;
pub mod stats_models;

pub use candidates::{
    DetectedPair, DuplicateCandidate, DuplicateCandidateRecord, DuplicateStatus,
    NewDuplicateCandidate, Resolution, ResolutionUpdate, Severity,
};
pub use core::{
    ActionFields, EntityType, GoalContext, GoalPoolEntry, GoalTermFields, MeasureFields,
    MeasureTarget, PersonalValueFields, Stored,
};
pub use stats_models::{EntityScanStats, PairFailure, ScanResult, UpsertFailure, UpsertReport};
