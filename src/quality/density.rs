use serde::Serialize;
use serde_json::json;

use super::lexicon::{has_digit, word_count, FILLER, TECHNICAL, USAGE};
use super::{QualityConfig, TestResult};
use crate::render::RenderedItem;

pub const ISSUE_LOW_DENSITY: &str = "low information density";
pub const ISSUE_TOO_SHORT: &str = "text too short";
pub const ISSUE_TOO_LONG: &str = "text too long";
pub const ISSUE_NO_NUMBERS: &str = "no concrete numbers";
pub const ISSUE_NO_TECHNICAL: &str = "no technical detail";
pub const ISSUE_NO_USAGE: &str = "no usage detail";
pub const ISSUE_FILLER: &str = "filler phrases";

const BASELINE: f64 = 100.0;
const PENALTY_SHORT: f64 = 30.0;
const PENALTY_LONG: f64 = 10.0;
const PENALTY_NO_DIGIT: f64 = 20.0;
const PENALTY_NO_TECHNICAL: f64 = 20.0;
const PENALTY_NO_USAGE: f64 = 20.0;
const PENALTY_PER_FILLER: f64 = 10.0;

#[derive(Debug, Clone, Serialize)]
pub struct ItemDensity {
    pub trace_id: String,
    pub words: usize,
    pub filler: usize,
    pub score: f64,
    pub issues: Vec<&'static str>,
}

pub fn score_item(text: &str, cfg: &QualityConfig) -> (f64, Vec<&'static str>, usize, usize) {
    let words = word_count(text);
    let filler = FILLER.count(text);
    let mut score = BASELINE;
    let mut issues = Vec::new();

    if words < cfg.min_words {
        score -= PENALTY_SHORT;
        issues.push(ISSUE_TOO_SHORT);
    } else if words > cfg.max_words {
        score -= PENALTY_LONG;
        issues.push(ISSUE_TOO_LONG);
    }
    if !has_digit(text) {
        score -= PENALTY_NO_DIGIT;
        issues.push(ISSUE_NO_NUMBERS);
    }
    if !TECHNICAL.is_match(text) {
        score -= PENALTY_NO_TECHNICAL;
        issues.push(ISSUE_NO_TECHNICAL);
    }
    if !USAGE.is_match(text) {
        score -= PENALTY_NO_USAGE;
        issues.push(ISSUE_NO_USAGE);
    }
    if filler > 0 {
        score -= PENALTY_PER_FILLER * filler as f64;
        issues.push(ISSUE_FILLER);
    }

    (score.clamp(0.0, 100.0), issues, words, filler)
}

/// Batch average of per-item density scores; fails below `density_pass`.
pub fn run(items: &[RenderedItem], cfg: &QualityConfig) -> TestResult {
    if items.is_empty() {
        return TestResult::empty_batch();
    }

    let per_item: Vec<ItemDensity> = items
        .iter()
        .map(|it| {
            let (score, issues, words, filler) = score_item(&it.text, cfg);
            ItemDensity {
                trace_id: it.trace_id().to_string(),
                words,
                filler,
                score,
                issues,
            }
        })
        .collect();

    let avg = per_item.iter().map(|d| d.score).sum::<f64>() / per_item.len() as f64;

    // Distinct item-level issues, first-seen order; the batch verdict leads.
    let mut issues: Vec<String> = Vec::new();
    let passed = avg >= cfg.density_pass;
    if !passed {
        issues.push(ISSUE_LOW_DENSITY.to_string());
    }
    for d in &per_item {
        for i in &d.issues {
            if !issues.iter().any(|x| x == i) {
                issues.push((*i).to_string());
            }
        }
    }

    TestResult {
        passed,
        score: avg,
        issues,
        details: json!({
            "average_score": avg,
            "items": per_item,
        }),
    }
}
