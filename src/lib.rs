// src/lib.rs
pub mod error;
pub mod lsh;
pub mod matching;
pub mod models;
pub mod severity;
pub mod store;
pub mod utils;

pub use error::DetectionError;
