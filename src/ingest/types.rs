// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Signal keys read as the "popularity" input of the heat score, first hit wins.
pub const POPULARITY_KEYS: [&str; 4] = ["score", "points", "upvotes", "stars"];
/// Signal keys read as the "discussion" input of the heat score, first hit wins.
pub const DISCUSSION_KEYS: [&str; 2] = ["comments", "replies"];

/// One discovered item, as handed over by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub url: String,
    /// Derived from `url` at the ingest boundary; empty until then.
    #[serde(default)]
    pub canonical_url: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub provider: String, // e.g. "hackernews", "github_trending"
    /// Provider-specific popularity signals (upvotes, comments, stars...).
    #[serde(default)]
    pub signals: BTreeMap<String, f64>,
    pub discovered_at: DateTime<Utc>,
    #[serde(default)]
    trace_id: Option<String>,
}

impl Candidate {
    pub fn new(
        provider: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            canonical_url: String::new(),
            title: title.into(),
            summary: String::new(),
            provider: provider.into(),
            signals: BTreeMap::new(),
            discovered_at,
            trace_id: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_signal(mut self, key: impl Into<String>, value: f64) -> Self {
        self.signals.insert(key.into(), value);
        self
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Assigns the trace id once; later calls keep the first id.
    pub fn assign_trace_id(&mut self, id: impl Into<String>) -> &str {
        self.trace_id.get_or_insert_with(|| id.into())
    }

    /// Identity used for dedup: the canonical URL when derived, else the raw URL.
    pub fn identity(&self) -> &str {
        if self.canonical_url.is_empty() {
            &self.url
        } else {
            &self.canonical_url
        }
    }

    pub fn popularity(&self) -> f64 {
        first_signal(&self.signals, &POPULARITY_KEYS)
    }

    pub fn discussion(&self) -> f64 {
        first_signal(&self.signals, &DISCUSSION_KEYS)
    }
}

fn first_signal(signals: &BTreeMap<String, f64>, keys: &[&str]) -> f64 {
    keys.iter()
        .find_map(|k| signals.get(*k).copied())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn discover(&self) -> Result<Vec<Candidate>>;
    fn name(&self) -> &str;
}
