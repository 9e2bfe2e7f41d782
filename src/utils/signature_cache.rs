// src/utils/signature_cache.rs
use sha2::{Digest, Sha256};

use crate::lsh::CompositeInput;
use crate::store::CachedSignature;

/// Hex SHA-256 over everything that shapes a composite signature: the
/// fields, their weights and the shingle size.
pub fn source_text_hash(input: &CompositeInput, shingle_size: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("k={}", shingle_size).as_bytes());
    for (field, weight) in input.fields().iter().zip(input.weights()) {
        hasher.update(b"\x1e");
        hasher.update(field.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(weight.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// A cached signature is reused only when both the content hash and the
/// algorithm version still match.
pub fn is_fresh(cached: &CachedSignature, text_hash: &str, algorithm_version: &str) -> bool {
    cached.source_text_hash == text_hash && cached.algorithm_version == algorithm_version
}
