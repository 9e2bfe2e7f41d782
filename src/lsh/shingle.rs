// src/lsh/shingle.rs
use std::collections::HashSet;

pub const DEFAULT_SHINGLE_SIZE: usize = 3;

pub type ShingleSet = HashSet<String>;

/// Lowercases and trims text before shingling.
pub fn normalize_for_shingling(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Splits text into the set of its contiguous `k`-character substrings.
///
/// Text shorter than `k` (after normalization) becomes a single shingle;
/// empty text yields an empty set. Works on characters, not bytes.
pub fn shingle(text: &str, k: usize) -> ShingleSet {
    let normalized = normalize_for_shingling(text);
    let chars: Vec<char> = normalized.chars().collect();

    if chars.is_empty() {
        return ShingleSet::new();
    }

    let k = k.max(1);
    if chars.len() < k {
        let mut single = ShingleSet::with_capacity(1);
        single.insert(normalized);
        return single;
    }

    chars
        .windows(k)
        .map(|window| window.iter().collect::<String>())
        .collect()
}
