use serde_json::json;
use std::collections::BTreeMap;

use super::lexicon::categorize;
use super::TestResult;
use crate::render::RenderedItem;

pub const ISSUE_NARROW_CATEGORIES: &str = "only two content categories";
pub const ISSUE_SINGLE_CATEGORY: &str = "too few content categories";

/// Categorize each item by title + summary (first match wins, else "other").
/// Three or more categories score 100, two score 70, fewer fail at 40.
pub fn run(items: &[RenderedItem]) -> TestResult {
    if items.is_empty() {
        return TestResult::empty_batch();
    }

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut per_item = Vec::with_capacity(items.len());
    for it in items {
        let text = format!("{} {}", it.candidate.title, it.candidate.summary);
        let cat = categorize(&text);
        *counts.entry(cat).or_insert(0) += 1;
        per_item.push(cat);
    }

    let (passed, score, issues) = match counts.len() {
        n if n >= 3 => (true, 100.0, vec![]),
        2 => (true, 70.0, vec![ISSUE_NARROW_CATEGORIES.to_string()]),
        _ => (false, 40.0, vec![ISSUE_SINGLE_CATEGORY.to_string()]),
    };

    TestResult {
        passed,
        score,
        issues,
        details: json!({
            "category_distribution": counts,
            "item_categories": per_item,
        }),
    }
}
