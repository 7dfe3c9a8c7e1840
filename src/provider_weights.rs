//! # Provider Weights
//!
//! Configurable mapping from provider names ("producthunt", "hackernews", ...)
//! to the base term of the heat score.
//!
//! - Deserializes from the `[providers]` section of the pipeline config.
//! - Lookup is case-insensitive; separators (`-`, space, `.`) fold to `_`.
//! - Aliases map short or legacy names to canonical ones (`hn` → `hackernews`).
//! - Fallback order: alias → exact match → default (0.5).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const UNKNOWN_PROVIDER_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderWeights {
    #[serde(default = "default_default_weight")]
    pub default_weight: f64,
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, f64>,
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, String>,
}

fn default_default_weight() -> f64 {
    UNKNOWN_PROVIDER_WEIGHT
}

fn default_weights() -> BTreeMap<String, f64> {
    // Realtime/announcement providers highest, deep discussion mid, trend listings lowest.
    [
        ("producthunt", 1.5),
        ("twitter", 1.4),
        ("reddit", 1.2),
        ("hackernews", 1.1),
        ("github_trending", 1.0),
        ("tavily", 0.9),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_aliases() -> BTreeMap<String, String> {
    [
        ("hn", "hackernews"),
        ("hacker_news", "hackernews"),
        ("ph", "producthunt"),
        ("product_hunt", "producthunt"),
        ("x", "twitter"),
        ("github", "github_trending"),
        ("gh_trending", "github_trending"),
    ]
    .into_iter()
    .map(|(a, c)| (a.to_string(), c.to_string()))
    .collect()
}

impl Default for ProviderWeights {
    fn default() -> Self {
        Self {
            default_weight: default_default_weight(),
            weights: default_weights(),
            aliases: default_aliases(),
        }
    }
}

impl ProviderWeights {
    /// Canonical provider name: normalized, then alias-resolved.
    pub fn canonical(&self, provider: &str) -> String {
        let n = normalize_name(provider);
        match self.aliases.get(&n) {
            Some(c) => normalize_name(c),
            None => n,
        }
    }

    pub fn weight_for(&self, provider: &str) -> f64 {
        let canon = self.canonical(provider);
        match self.weights.get(&canon) {
            Some(&w) if w.is_finite() => w,
            _ => self.default_weight,
        }
    }
}

/// Lowercase, fold separators to `_`, drop leading/trailing underscores.
pub fn normalize_name(s: &str) -> String {
    let folded: String = s
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|ch| if matches!(ch, '-' | ' ' | '.' | '/') { '_' } else { ch })
        .collect();
    folded
        .split('_')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
