// src/lsh/mod.rs
pub mod composite;
pub mod minhash;
pub mod shingle;

pub use composite::CompositeInput;
pub use minhash::{estimate_similarity, HashFamily, Signature, DEFAULT_NUM_HASHES, DEFAULT_SEED};
pub use shingle::{shingle, ShingleSet, DEFAULT_SHINGLE_SIZE};

use crate::error::DetectionError;

/// Bumped whenever shingling or hashing changes in a way that invalidates
/// cached signatures.
pub const ALGORITHM_REVISION: u32 = 1;

/// Shingle size plus the immutable hash family. Built once at startup and
/// shared by reference with every detector call.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureEngine {
    shingle_size: usize,
    family: HashFamily,
}

impl SignatureEngine {
    pub fn new(num_hashes: usize, seed: u64, shingle_size: usize) -> Result<Self, DetectionError> {
        if shingle_size == 0 {
            return Err(DetectionError::Config("shingle size must be positive".to_string()));
        }
        Ok(Self {
            shingle_size,
            family: HashFamily::new(num_hashes, seed)?,
        })
    }

    pub fn shingle_size(&self) -> usize {
        self.shingle_size
    }

    pub fn num_hashes(&self) -> usize {
        self.family.num_hashes()
    }

    pub fn seed(&self) -> u64 {
        self.family.seed()
    }

    /// Tag stored next to cached signatures.
    pub fn algorithm_version(&self) -> String {
        format!(
            "minhash-v{}/k{}/n{}/seed{}",
            ALGORITHM_REVISION,
            self.shingle_size,
            self.family.num_hashes(),
            self.family.seed()
        )
    }

    pub fn text_signature(&self, text: &str) -> Signature {
        let shingles = shingle(text, self.shingle_size);
        self.family.signature(shingles.iter().map(String::as_str))
    }

    pub fn composite_signature(&self, input: &CompositeInput) -> Signature {
        if input.is_blank() {
            return self.family.signature(std::iter::empty::<&str>());
        }
        let shingles = input.shingles(self.shingle_size);
        self.family.signature(shingles.iter().map(String::as_str))
    }

    /// Compares two signatures produced by this engine. Signatures of a
    /// different length come from another family and cannot be compared.
    pub fn compare(&self, a: &Signature, b: &Signature) -> Result<f64, DetectionError> {
        if a.len() != self.family.num_hashes() || b.len() != self.family.num_hashes() {
            return Err(DetectionError::SignatureMismatch {
                left: a.len(),
                right: b.len(),
            });
        }
        Ok(estimate_similarity(a, b))
    }
}

impl Default for SignatureEngine {
    fn default() -> Self {
        Self {
            shingle_size: DEFAULT_SHINGLE_SIZE,
            family: HashFamily::new(DEFAULT_NUM_HASHES, DEFAULT_SEED)
                .unwrap_or_else(|_| unreachable!("default hash count is positive")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_configuration() {
        let engine = SignatureEngine::default();
        assert_eq!(engine.num_hashes(), 100);
        assert_eq!(engine.shingle_size(), 3);
        assert_eq!(engine.algorithm_version(), "minhash-v1/k3/n100/seed42");
    }

    #[test]
    fn test_compare_rejects_foreign_signatures() {
        let engine = SignatureEngine::default();
        let other = SignatureEngine::new(64, DEFAULT_SEED, 3).unwrap();
        let ours = engine.text_signature("stretch");
        let theirs = other.text_signature("stretch");
        assert_eq!(
            engine.compare(&ours, &theirs),
            Err(DetectionError::SignatureMismatch { left: 100, right: 64 })
        );
    }

    #[test]
    fn test_identity_through_engine() {
        let engine = SignatureEngine::default();
        let sig = engine.text_signature("Call grandma");
        assert_eq!(engine.compare(&sig, &sig).unwrap(), 1.0);
    }

    #[test]
    fn test_blank_composite_gives_blank_signature() {
        let engine = SignatureEngine::default();
        let blank = CompositeInput::new(vec!["".into(), "   ".into()], Some(&[0.7, 0.3])).unwrap();
        let sig = engine.composite_signature(&blank);
        assert!(sig.is_blank());
        assert_eq!(sig.len(), engine.num_hashes());
        assert_eq!(sig, engine.text_signature(""));

        let filled = CompositeInput::new(vec!["Evening walk".into(), "".into()], None).unwrap();
        assert!(!engine.composite_signature(&filled).is_blank());
    }

    #[test]
    fn test_zero_shingle_size_is_rejected() {
        assert!(SignatureEngine::new(100, 42, 0).is_err());
    }
}
