// src/matching/text.rs
use once_cell::sync::Lazy;
use regex::Regex;
use strsim::normalized_levenshtein;

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").unwrap_or_else(|_| unreachable!("whitespace pattern is a valid regex")));

/// Lowercases, trims and collapses internal whitespace runs to one space.
pub fn normalize_text(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").to_lowercase()
}

/// Direct (non-MinHash) similarity between two strings: normalised
/// Levenshtein over normalised text. Empty input on either side scores 0.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_text(a);
    let b = normalize_text(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(&a, &b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_collapses_whitespace() {
        assert_eq!(normalize_text("  Run \t the\n\nRiver  "), "run the river");
    }

    #[test]
    fn test_case_and_spacing_do_not_matter() {
        assert_eq!(text_similarity("Summer  Fitness", "summer fitness"), 1.0);
    }

    #[test]
    fn test_empty_strings_are_dissimilar() {
        assert_eq!(text_similarity("", ""), 0.0);
        assert_eq!(text_similarity("   ", "focus"), 0.0);
    }

    #[test]
    fn test_small_edits_stay_high() {
        let s = text_similarity("Health focus", "Health focus!");
        assert!(s > 0.9 && s < 1.0);
    }
}
