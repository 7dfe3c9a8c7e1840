//! Repeated-narrative check: items in one batch that open the same way.

use serde::Serialize;

pub const DEFAULT_PREFIX_CHARS: usize = 200;
pub const DEFAULT_SIMILARITY: f64 = 0.9;
pub const ISSUE_REPEATED_NARRATIVE: &str = "repeated narrative across items";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RepeatedPair {
    pub first: usize,
    pub second: usize,
    pub similarity: f64,
}

fn opening(text: &str, prefix_chars: usize) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .take(prefix_chars)
        .collect()
}

/// Index pairs whose openings reach `threshold` normalized Levenshtein similarity.
pub fn repeated_pairs(texts: &[&str], prefix_chars: usize, threshold: f64) -> Vec<RepeatedPair> {
    let openings: Vec<String> = texts.iter().map(|t| opening(t, prefix_chars)).collect();
    let mut out = Vec::new();
    for i in 0..openings.len() {
        if openings[i].is_empty() {
            continue;
        }
        for j in (i + 1)..openings.len() {
            let sim = strsim::normalized_levenshtein(&openings[i], &openings[j]);
            if sim >= threshold {
                out.push(RepeatedPair {
                    first: i,
                    second: j,
                    similarity: sim,
                });
            }
        }
    }
    out
}
