//! Bloom taxonomy levels and their mapping to question difficulty.

/// Ordered cognitive-difficulty taxonomy, lowest to highest.
pub const BLOOM_LEVELS: [&str; 6] = [
    "REMEMBER",
    "UNDERSTAND",
    "APPLY",
    "ANALYZE",
    "EVALUATE",
    "CREATE",
];

/// Map a Bloom level to a coarse difficulty bucket. Unknown levels fall
/// back to MEDIUM.
pub fn bloom_to_difficulty(bloom_level: &str) -> &'static str {
    match bloom_level {
        "REMEMBER" | "UNDERSTAND" => "EASY",
        "APPLY" | "ANALYZE" => "MEDIUM",
        "EVALUATE" | "CREATE" => "HARD",
        _ => "MEDIUM",
    }
}

/// All Bloom levels included when a level is selected: a higher level
/// includes every lower one. Unknown levels yield an empty slice.
pub fn included_levels(selected: &str) -> &'static [&'static str] {
    match BLOOM_LEVELS.iter().position(|l| *l == selected) {
        Some(idx) => &BLOOM_LEVELS[..=idx],
        None => &[],
    }
}

/// True if `difficulty` is one of the three recognized buckets.
pub fn is_valid_difficulty(difficulty: &str) -> bool {
    matches!(difficulty, "EASY" | "MEDIUM" | "HARD")
}
