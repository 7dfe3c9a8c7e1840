//! # Trace Ledger
//!
//! Per-candidate record of every pipeline stage, keyed by a trace id minted
//! at discovery (`PREFIX-YYYYMMDD-HASH6-RAND4`). Records are stored one
//! document per id, partitioned by the creation date embedded in the id.
//!
//! Logging must never crash the pipeline it observes: store failures are
//! logged through `tracing` and otherwise ignored, and appends to unknown ids
//! are no-ops.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::ingest::types::Candidate;

pub const DEFAULT_PREFIX: &str = "TRG";
pub const FINAL_OUTPUT_CAP: usize = 1000;
const PUBLISH_RESPONSE_CAP: usize = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Started,
    Error,
    Completed,
    Failed,
}

impl TraceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceStatus::Started => "started",
            TraceStatus::Error => "error",
            TraceStatus::Completed => "completed",
            TraceStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleStatus {
    pub started_at: DateTime<Utc>,
    pub status: ModuleState,
    pub log_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub module: String,
    pub level: Level,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceRecord {
    pub trace_id: String,
    pub created_at: DateTime<Utc>,
    pub status: TraceStatus,
    pub source: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleStatus>,
    #[serde(default)]
    pub final_output: Option<String>,
    #[serde(default)]
    pub errors: Vec<LogEntry>,
}

impl TraceRecord {
    fn push(&mut self, entry: LogEntry) {
        let module = self
            .modules
            .entry(entry.module.clone())
            .or_insert_with(|| ModuleStatus {
                started_at: entry.timestamp,
                status: ModuleState::Running,
                log_count: 0,
            });
        module.log_count += 1;
        match entry.level {
            Level::Error => module.status = ModuleState::Error,
            Level::Debug => {}
            Level::Info | Level::Warning => module.status = ModuleState::Success,
        }

        if entry.level == Level::Error {
            self.status = TraceStatus::Error;
            self.errors.push(entry.clone());
        }
        self.logs.push(entry);
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary {
            trace_id: self.trace_id.clone(),
            name: self.name.chars().take(50).collect(),
            source: self.source.clone(),
            status: self.status,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceSummary {
    pub trace_id: String,
    pub name: String,
    pub source: String,
    pub status: TraceStatus,
    pub created_at: DateTime<Utc>,
}

/// Date partition (`YYYYMMDD`) embedded in a trace id, if well-formed.
pub fn date_partition(trace_id: &str) -> Option<&str> {
    let part = trace_id.split('-').nth(1)?;
    (part.len() == 8 && part.bytes().all(|b| b.is_ascii_digit())).then_some(part)
}

/// Shape check: `PREFIX-YYYYMMDD-HASH6-RAND4` with an uppercase-alphanumeric prefix.
pub fn is_trace_id(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    let hex_upper = |p: &str, n: usize| {
        p.len() == n && p.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
    };
    parts.len() == 4
        && !parts[0].is_empty()
        && parts[0].bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        && date_partition(s).is_some()
        && hex_upper(parts[2], 6)
        && hex_upper(parts[3], 4)
}

/// Reduce a configured prefix to uppercase ASCII alphanumerics so minted ids
/// pass [`is_trace_id`] and partition by date. Empty results fall back to
/// [`DEFAULT_PREFIX`].
pub fn normalize_prefix(raw: &str) -> String {
    let p: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if p.is_empty() {
        DEFAULT_PREFIX.to_string()
    } else {
        p
    }
}

/* ----------------------------
Stores
---------------------------- */

pub trait TraceStore: Send + Sync {
    fn load(&self, trace_id: &str) -> Result<Option<TraceRecord>, StoreError>;
    fn save(&self, record: &TraceRecord) -> Result<(), StoreError>;
    /// Most recent first, at most `limit`.
    fn list_recent(&self, limit: usize) -> Result<Vec<TraceSummary>, StoreError>;
}

/// One JSON document per trace under `{dir}/{YYYYMMDD}/{trace_id}.json`.
#[derive(Debug, Clone)]
pub struct FileTraceStore {
    dir: PathBuf,
}

impl FileTraceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, trace_id: &str) -> Option<PathBuf> {
        // Ids become file names; anything that could escape the directory is rejected.
        if trace_id.is_empty()
            || trace_id.contains(['/', '\\'])
            || trace_id.contains("..")
        {
            return None;
        }
        let date = date_partition(trace_id).unwrap_or("unknown");
        Some(self.dir.join(date).join(format!("{trace_id}.json")))
    }
}

impl TraceStore for FileTraceStore {
    fn load(&self, trace_id: &str) -> Result<Option<TraceRecord>, StoreError> {
        let Some(path) = self.path_for(trace_id) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&s)?))
    }

    fn save(&self, record: &TraceRecord) -> Result<(), StoreError> {
        let Some(path) = self.path_for(&record.trace_id) else {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unusable trace id {:?}", record.trace_id),
            )));
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        fs::rename(tmp, &path)?;
        Ok(())
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<TraceSummary>, StoreError> {
        if !self.dir.exists() || limit == 0 {
            return Ok(Vec::new());
        }
        let mut days: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        days.sort();
        days.reverse();

        let mut out = Vec::new();
        for day in days {
            let mut in_day: Vec<TraceSummary> = fs::read_dir(&day)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|x| x == "json"))
                .filter_map(|p| {
                    // Unreadable documents are skipped, not fatal.
                    let s = fs::read_to_string(&p).ok()?;
                    serde_json::from_str::<TraceRecord>(&s).ok()
                })
                .map(|r| r.summary())
                .collect();
            in_day.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            for s in in_day {
                out.push(s);
                if out.len() >= limit {
                    return Ok(out);
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
pub struct MemoryTraceStore {
    inner: Mutex<BTreeMap<String, TraceRecord>>,
}

impl TraceStore for MemoryTraceStore {
    fn load(&self, trace_id: &str) -> Result<Option<TraceRecord>, StoreError> {
        Ok(self.inner.lock().get(trace_id).cloned())
    }

    fn save(&self, record: &TraceRecord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .insert(record.trace_id.clone(), record.clone());
        Ok(())
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<TraceSummary>, StoreError> {
        let mut all: Vec<TraceSummary> = self.inner.lock().values().map(|r| r.summary()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }
}

/* ----------------------------
Ledger
---------------------------- */

pub struct Ledger {
    store: Box<dyn TraceStore>,
    prefix: String,
    // One critical section per load-modify-save cycle.
    cycle: Mutex<()>,
}

impl Ledger {
    pub fn new(store: Box<dyn TraceStore>, prefix: impl AsRef<str>) -> Self {
        Self {
            store,
            prefix: normalize_prefix(prefix.as_ref()),
            cycle: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::<MemoryTraceStore>::default(), DEFAULT_PREFIX)
    }

    pub fn file(dir: impl Into<PathBuf>, prefix: impl AsRef<str>) -> Self {
        Self::new(Box::new(FileTraceStore::new(dir)), prefix)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn mint_trace_id(&self, candidate: &Candidate) -> String {
        self.mint_trace_id_at(candidate, Utc::now())
    }

    /// Hash of the stable fields (sorted-key JSON) + date + random suffix.
    pub fn mint_trace_id_at(&self, candidate: &Candidate, now: DateTime<Utc>) -> String {
        let stable: BTreeMap<&str, &str> = [
            ("name", candidate.title.as_str()),
            ("source", candidate.provider.as_str()),
            ("url", candidate.url.as_str()),
        ]
        .into_iter()
        .collect();
        // Serializing a map of strings cannot fail.
        let canonical = serde_json::to_string(&stable).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        let hash6: String = digest
            .iter()
            .take(3)
            .map(|b| format!("{b:02X}"))
            .collect();
        let suffix: u16 = rand::rng().random();
        format!(
            "{}-{}-{}-{:04X}",
            self.prefix,
            now.format("%Y%m%d"),
            hash6,
            suffix
        )
    }

    fn load(&self, trace_id: &str) -> Option<TraceRecord> {
        match self.store.load(trace_id) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "ledger", trace_id, error = %e, "trace unreadable");
                None
            }
        }
    }

    fn save(&self, record: &TraceRecord) {
        if let Err(e) = self.store.save(record) {
            tracing::warn!(target: "ledger", trace_id = %record.trace_id, error = %e, "trace not saved");
        }
    }

    /// Create the record for a freshly minted id. An existing record is kept.
    pub fn create_trace(&self, trace_id: &str, candidate: &Candidate) {
        let _guard = self.cycle.lock();
        if self.load(trace_id).is_some() {
            return;
        }
        let record = TraceRecord {
            trace_id: trace_id.to_string(),
            created_at: Utc::now(),
            status: TraceStatus::Started,
            source: candidate.provider.clone(),
            name: candidate.title.clone(),
            url: candidate.url.clone(),
            logs: Vec::new(),
            modules: BTreeMap::new(),
            final_output: None,
            errors: Vec::new(),
        };
        self.save(&record);
    }

    /// Append a stage event. Unknown ids are ignored.
    pub fn append(
        &self,
        trace_id: &str,
        stage: &str,
        level: Level,
        message: impl Into<String>,
        data: serde_json::Value,
    ) {
        let _guard = self.cycle.lock();
        let Some(mut record) = self.load(trace_id) else {
            return;
        };
        record.push(LogEntry {
            timestamp: Utc::now(),
            module: stage.to_string(),
            level,
            message: message.into(),
            data,
        });
        self.save(&record);
    }

    /// Publish event for one item; sets the overall status to completed or failed.
    pub fn record_publish(&self, trace_id: &str, publisher: &str, success: bool, response: &str) {
        let _guard = self.cycle.lock();
        let Some(mut record) = self.load(trace_id) else {
            return;
        };
        let response: String = response.chars().take(PUBLISH_RESPONSE_CAP).collect();
        record.push(LogEntry {
            timestamp: Utc::now(),
            module: publisher.to_string(),
            level: if success { Level::Info } else { Level::Error },
            message: if success { "published" } else { "publish failed" }.to_string(),
            data: serde_json::json!({ "success": success, "response": response }),
        });
        record.status = if success {
            TraceStatus::Completed
        } else {
            TraceStatus::Failed
        };
        self.save(&record);
    }

    /// Store the rendered text (truncated). Status is left to the publish event.
    pub fn set_final_output(&self, trace_id: &str, output: &str) {
        let _guard = self.cycle.lock();
        let Some(mut record) = self.load(trace_id) else {
            return;
        };
        record.final_output = Some(output.chars().take(FINAL_OUTPUT_CAP).collect());
        self.save(&record);
    }

    pub fn get(&self, trace_id: &str) -> Option<TraceRecord> {
        let _guard = self.cycle.lock();
        self.load(trace_id)
    }

    pub fn list_recent(&self, limit: usize) -> Vec<TraceSummary> {
        let _guard = self.cycle.lock();
        self.store.list_recent(limit).unwrap_or_else(|e| {
            tracing::warn!(target: "ledger", error = %e, "listing traces failed");
            Vec::new()
        })
    }

    /// Human-readable report; unknown ids yield an explicit not-found report.
    pub fn diagnose(&self, trace_id: &str) -> String {
        match self.get(trace_id) {
            Some(r) => crate::diagnosis::render_report(&r),
            None => crate::diagnosis::not_found_report(trace_id),
        }
    }
}
