//! # Identity & Novelty Tracker
//!
//! Canonicalizes item identity (tracking query parameters stripped) and keeps
//! the durable record of what was published inside the dedup window (24h by
//! default).
//!
//! - `canonicalize` never fails: unparseable input is returned unchanged.
//! - Reads degrade to "nothing published" when the store is missing/unreadable.
//! - `record_published` is the single write path; each load-modify-save cycle
//!   runs under one mutex.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::StoreError;
use crate::ingest::types::Candidate;

pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Query keys dropped during canonicalization (compared case-insensitively).
/// Any key starting with `utm_` is dropped as well.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "gclsrc", "dclid", "msclkid", "yclid", "twclid", "ttclid", "igshid",
    "li_fat_id", "mc_cid", "mc_eid", "_hsenc", "_hsmi", "ref", "ref_src", "ref_url", "referrer",
    "source", "src", "campaign", "campaign_id", "cmpid", "spm",
];

fn is_tracking_key(key: &str) -> bool {
    let k = key.trim().to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

/// Strip tracking parameters, keeping the remaining ones in their original order.
pub fn canonicalize(raw: &str) -> String {
    try_canonicalize(raw).unwrap_or_else(|| raw.to_string())
}

fn try_canonicalize(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if url.cannot_be_a_base() {
        return None;
    }

    let kept: Vec<String> = match url.query() {
        None => return Some(url.to_string()),
        Some(q) => q
            .split('&')
            .filter(|seg| !seg.is_empty())
            .filter(|seg| {
                // Decode the key only for matching; the segment itself is kept verbatim.
                let key = url::form_urlencoded::parse(seg.as_bytes())
                    .next()
                    .map(|(k, _)| k.into_owned())
                    .unwrap_or_default();
                !is_tracking_key(&key)
            })
            .map(str::to_string)
            .collect(),
    };

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&kept.join("&")));
    }
    Some(url.to_string())
}

/* ----------------------------
Persisted shape
---------------------------- */

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishedRecord {
    pub original_url: String,
    pub canonical_url: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub publish_count: u32,
}

/// Keyed by canonical URL, so one URL holds at most one live record.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PublishedSet {
    #[serde(default)]
    pub records: BTreeMap<String, PublishedRecord>,
}

/// Backing store for the published set. Implementations load and save the
/// whole document; the tracker serializes access.
pub trait RecordStore: Send + Sync {
    fn load(&self) -> Result<PublishedSet, StoreError>;
    fn save(&self, set: &PublishedSet) -> Result<(), StoreError>;
}

/// Plain JSON document on disk (operator-inspectable, diff-able).
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for JsonFileStore {
    fn load(&self) -> Result<PublishedSet, StoreError> {
        if !self.path.exists() {
            return Ok(PublishedSet::default());
        }
        let s = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&s)?)
    }

    fn save(&self, set: &PublishedSet) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(set)?)?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

/// In-process store, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<PublishedSet>,
}

impl RecordStore for MemoryStore {
    fn load(&self) -> Result<PublishedSet, StoreError> {
        Ok(self.inner.lock().clone())
    }

    fn save(&self, set: &PublishedSet) -> Result<(), StoreError> {
        *self.inner.lock() = set.clone();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TrackerStats {
    pub total_recorded: usize,
    pub active_in_window: usize,
    pub window_hours: i64,
}

/* ----------------------------
Tracker
---------------------------- */

pub struct NoveltyTracker {
    store: Box<dyn RecordStore>,
    window: Duration,
    // One critical section per load-modify-save cycle.
    cycle: Mutex<()>,
}

impl NoveltyTracker {
    pub fn new(store: Box<dyn RecordStore>) -> Self {
        Self::with_window(store, Duration::hours(DEFAULT_WINDOW_HOURS))
    }

    pub fn with_window(store: Box<dyn RecordStore>, window: Duration) -> Self {
        Self {
            store,
            window,
            cycle: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::<MemoryStore>::default())
    }

    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(JsonFileStore::new(path)))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn load_or_empty(&self) -> PublishedSet {
        match self.store.load() {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!(target: "tracker", error = %e, "published store unreadable; assuming empty");
                PublishedSet::default()
            }
        }
    }

    fn is_duplicate_in(&self, set: &PublishedSet, url: &str, now: DateTime<Utc>) -> bool {
        if url.trim().is_empty() {
            return false;
        }
        let canonical = canonicalize(url);
        set.records.values().any(|rec| {
            canonicalize(&rec.original_url) == canonical && now - rec.published_at < self.window
        })
    }

    pub fn is_duplicate(&self, url: &str) -> bool {
        self.is_duplicate_at(url, Utc::now())
    }

    /// True when `url` (canonicalized) was published less than one window before `now`.
    pub fn is_duplicate_at(&self, url: &str, now: DateTime<Utc>) -> bool {
        let _guard = self.cycle.lock();
        let set = self.load_or_empty();
        self.is_duplicate_in(&set, url, now)
    }

    pub fn filter_new(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        self.partition_new_at(candidates, Utc::now()).0
    }

    /// Split into `(novel, duplicates)`, both preserving input order.
    pub fn partition_new_at(
        &self,
        candidates: Vec<Candidate>,
        now: DateTime<Utc>,
    ) -> (Vec<Candidate>, Vec<Candidate>) {
        let set = {
            let _guard = self.cycle.lock();
            self.load_or_empty()
        };
        candidates
            .into_iter()
            .partition(|c| !self.is_duplicate_in(&set, &c.url, now))
    }

    pub fn record_published(&self, candidates: &[Candidate]) -> usize {
        self.record_published_at(candidates, Utc::now())
    }

    /// Prune expired records, then add one record per candidate not already present.
    /// Returns how many records were added.
    pub fn record_published_at(&self, candidates: &[Candidate], now: DateTime<Utc>) -> usize {
        let _guard = self.cycle.lock();
        let mut set = self.load_or_empty();

        let before = set.records.len();
        set.records.retain(|_, rec| now - rec.published_at < self.window);
        let pruned = before - set.records.len();

        let mut added = 0usize;
        for c in candidates {
            if c.url.trim().is_empty() {
                continue;
            }
            let canonical = canonicalize(&c.url);
            if set.records.contains_key(&canonical) {
                continue;
            }
            set.records.insert(
                canonical.clone(),
                PublishedRecord {
                    original_url: c.url.clone(),
                    canonical_url: canonical,
                    title: c.title.clone(),
                    published_at: now,
                    publish_count: 1,
                },
            );
            added += 1;
        }

        if let Err(e) = self.store.save(&set) {
            tracing::warn!(target: "tracker", error = %e, "failed to persist published records");
            return 0;
        }
        tracing::debug!(target: "tracker", added, pruned, total = set.records.len(), "published records updated");
        added
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> TrackerStats {
        let _guard = self.cycle.lock();
        let set = self.load_or_empty();
        let active = set
            .records
            .values()
            .filter(|r| now - r.published_at < self.window)
            .count();
        TrackerStats {
            total_recorded: set.records.len(),
            active_in_window: active,
            window_hours: self.window.num_hours(),
        }
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn cand(url: &str) -> Candidate {
        Candidate::new("hackernews", url, "Some title", t0())
    }

    #[test]
    fn strips_tracking_params_and_keeps_order() {
        let u = "https://example.com/p?b=2&utm_source=x&a=1&FBCLID=abc&ref=hn";
        assert_eq!(canonicalize(u), "https://example.com/p?b=2&a=1");
    }

    #[test]
    fn strips_trailing_empty_query() {
        assert_eq!(
            canonicalize("https://example.com/p?utm_medium=email"),
            "https://example.com/p"
        );
        assert_eq!(canonicalize("https://example.com/p?"), "https://example.com/p");
    }

    #[test]
    fn unparseable_input_is_identity() {
        assert_eq!(canonicalize("not a url ?utm_source=x"), "not a url ?utm_source=x");
        assert_eq!(canonicalize(""), "");
    }

    #[test]
    fn canonicalize_is_idempotent() {
        for u in [
            "https://Example.com/a?x=1&utm_campaign=y#frag",
            "https://example.com",
            "http://example.com/a?q=a%20b&gclid=1&q=c",
            "https://example.com/?&&ref=x&",
            "mailto:someone@example.com",
            "garbage",
        ] {
            let once = canonicalize(u);
            assert_eq!(canonicalize(&once), once, "not idempotent for {u}");
        }
    }

    #[test]
    fn duplicate_window_boundary_is_exclusive() {
        let tr = NoveltyTracker::in_memory();
        let c = cand("https://example.com/post?utm_source=feed");
        assert_eq!(tr.record_published_at(&[c], t0()), 1);

        let almost = t0() + Duration::hours(24) - Duration::seconds(1);
        assert!(tr.is_duplicate_at("https://example.com/post", almost));
        assert!(!tr.is_duplicate_at("https://example.com/post", t0() + Duration::hours(24)));
    }

    #[test]
    fn record_skips_present_and_prunes_expired() {
        let tr = NoveltyTracker::in_memory();
        let c = cand("https://example.com/a");
        assert_eq!(tr.record_published_at(&[c.clone()], t0()), 1);
        assert_eq!(tr.record_published_at(&[c.clone()], t0() + Duration::hours(1)), 0);

        // After the window the old record is pruned and a fresh one is written.
        let later = t0() + Duration::hours(25);
        assert_eq!(tr.record_published_at(&[c], later), 1);
        let stats = tr.stats_at(later);
        assert_eq!(stats.total_recorded, 1);
        assert_eq!(stats.active_in_window, 1);
    }

    #[test]
    fn partition_preserves_order() {
        let tr = NoveltyTracker::in_memory();
        tr.record_published_at(&[cand("https://a.dev/2")], t0());
        let input = vec![
            cand("https://a.dev/1"),
            cand("https://a.dev/2?utm_term=z"),
            cand("https://a.dev/3"),
        ];
        let (fresh, dups) = tr.partition_new_at(input, t0() + Duration::minutes(5));
        let urls: Vec<_> = fresh.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.dev/1", "https://a.dev/3"]);
        assert_eq!(dups.len(), 1);
    }

    #[test]
    fn unreadable_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("published.json");
        fs::write(&path, "{ not json").unwrap();
        let tr = NoveltyTracker::json_file(&path);
        assert!(!tr.is_duplicate_at("https://a.dev/1", t0()));

        // The write path replaces the corrupt document with a valid one.
        assert_eq!(tr.record_published_at(&[cand("https://a.dev/1")], t0()), 1);
        assert!(tr.is_duplicate_at("https://a.dev/1", t0()));
    }
}
