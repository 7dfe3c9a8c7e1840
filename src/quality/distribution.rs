use serde_json::json;
use std::collections::BTreeMap;

use super::{QualityConfig, TestResult};
use crate::provider_weights::normalize_name;
use crate::render::RenderedItem;

pub const ISSUE_TOO_FEW_PROVIDERS: &str = "too few providers";
pub const ISSUE_PROVIDER_DOMINATES: &str = "one provider dominates the batch";
pub const ISSUE_NO_REALTIME: &str = "no realtime provider";
pub const ISSUE_NO_DEEP: &str = "no deep-discussion provider";

const SCORE_PROVIDER_COUNT: f64 = 30.0;
const SCORE_PROVIDER_SHARE: f64 = 20.0;
const SCORE_REALTIME: f64 = 25.0;
const SCORE_DEEP: f64 = 25.0;

fn in_category(provider: &str, category: &[String]) -> bool {
    category.iter().any(|p| normalize_name(p) == provider)
}

/// Provider spread of the batch; each of the four checks adds a fixed part of 100.
pub fn run(items: &[RenderedItem], cfg: &QualityConfig) -> TestResult {
    if items.is_empty() {
        return TestResult::empty_batch();
    }

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for it in items {
        *counts.entry(normalize_name(&it.candidate.provider)).or_insert(0) += 1;
    }
    let total = items.len();

    let mut score = 0.0;
    let mut issues = Vec::new();

    if counts.len() >= cfg.min_providers {
        score += SCORE_PROVIDER_COUNT;
    } else {
        issues.push(ISSUE_TOO_FEW_PROVIDERS.to_string());
    }

    let (top_provider, top_count) = counts
        .iter()
        .max_by_key(|(_, n)| **n)
        .map(|(p, n)| (p.clone(), *n))
        .unwrap_or_default();
    let max_share = top_count as f64 / total as f64;
    if max_share <= cfg.max_provider_share {
        score += SCORE_PROVIDER_SHARE;
    } else {
        issues.push(ISSUE_PROVIDER_DOMINATES.to_string());
    }

    let has_realtime = counts.keys().any(|p| in_category(p, &cfg.realtime_providers));
    if has_realtime {
        score += SCORE_REALTIME;
    } else {
        issues.push(ISSUE_NO_REALTIME.to_string());
    }

    let has_deep = counts.keys().any(|p| in_category(p, &cfg.deep_providers));
    if has_deep {
        score += SCORE_DEEP;
    } else {
        issues.push(ISSUE_NO_DEEP.to_string());
    }

    TestResult {
        passed: issues.is_empty(),
        score,
        issues,
        details: json!({
            "provider_distribution": counts,
            "total_items": total,
            "unique_providers": counts.len(),
            "top_provider": top_provider,
            "max_share": max_share,
            "has_realtime": has_realtime,
            "has_deep": has_deep,
        }),
    }
}
