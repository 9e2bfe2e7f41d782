// src/matching/mod.rs
pub mod action;
pub mod db;
pub mod detector;
pub mod goal;
pub mod goal_term;
pub mod manager;
pub mod measure;
pub mod personal_value;
pub mod text;

pub use db::PgDuplicateStore;
pub use detector::{Detector, DetectorSet, DuplicateDetector, PairScore};
pub use manager::DeduplicationManager;
