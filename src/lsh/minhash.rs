// src/lsh/minhash.rs
//! MinHash signatures over shingle sets.
//!
//! Each hash function is `h_i(x) = (a_i * x + b_i) mod p` with `p = 2^61 - 1`,
//! applied to a 64-bit content hash of the shingle (SHA-256, first 8 bytes).
//! The `(a_i, b_i)` table is drawn once from a seeded `StdRng` and never
//! changes afterwards, so equal seeds give equal signatures across runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DetectionError;

pub const DEFAULT_NUM_HASHES: usize = 100;
pub const DEFAULT_SEED: u64 = 42;

/// Mersenne prime 2^61 - 1.
pub const HASH_PRIME: u64 = (1u64 << 61) - 1;

/// Value every slot holds for an empty shingle set.
pub const EMPTY_SLOT: u64 = u64::MAX;

/// Immutable family of universal hash functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashFamily {
    seed: u64,
    coefficients: Vec<(u64, u64)>,
}

impl HashFamily {
    pub fn new(num_hashes: usize, seed: u64) -> Result<Self, DetectionError> {
        if num_hashes == 0 {
            return Err(DetectionError::Config(
                "MinHash family needs at least one hash function".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let coefficients = (0..num_hashes)
            .map(|_| (rng.gen_range(1..HASH_PRIME), rng.gen_range(0..HASH_PRIME)))
            .collect();

        Ok(Self { seed, coefficients })
    }

    pub fn num_hashes(&self) -> usize {
        self.coefficients.len()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    fn apply(&self, index: usize, x: u64) -> u64 {
        let (a, b) = self.coefficients[index];
        ((a as u128 * x as u128 + b as u128) % HASH_PRIME as u128) as u64
    }

    /// Computes the signature of a set of shingles.
    pub fn signature<'a, I>(&self, shingles: I) -> Signature
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values = vec![EMPTY_SLOT; self.num_hashes()];

        for shingle in shingles {
            let x = content_hash(shingle);
            for (i, slot) in values.iter_mut().enumerate() {
                let h = self.apply(i, x);
                if h < *slot {
                    *slot = h;
                }
            }
        }

        Signature { values }
    }
}

/// 64-bit content hash of a shingle: SHA-256 truncated to its first 8 bytes.
pub fn content_hash(shingle: &str) -> u64 {
    let digest = Sha256::digest(shingle.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// One minimum per hash function of the family that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    values: Vec<u64>,
}

impl Signature {
    pub fn from_values(values: Vec<u64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when the signature was built from an empty shingle set.
    pub fn is_blank(&self) -> bool {
        self.values.iter().all(|&v| v == EMPTY_SLOT)
    }

    /// Little-endian encoding used by the signature cache.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DetectionError> {
        if bytes.is_empty() || bytes.len() % 8 != 0 {
            return Err(DetectionError::InvalidSignatureBytes(bytes.len()));
        }
        let values = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                u64::from_le_bytes(word)
            })
            .collect();
        Ok(Self { values })
    }
}

/// Fraction of positions where the two signatures agree: the MinHash
/// estimate of the Jaccard similarity of the underlying shingle sets.
///
/// Returns 0.0 for signatures of different lengths, for empty signatures and
/// for positions that hold the empty-set sentinel, so blank content is never
/// similar to anything (not even other blank content).
pub fn estimate_similarity(a: &Signature, b: &Signature) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let matches = a
        .values
        .iter()
        .zip(b.values.iter())
        .filter(|(x, y)| x == y && **x != EMPTY_SLOT)
        .count();

    matches as f64 / a.len() as f64
}
