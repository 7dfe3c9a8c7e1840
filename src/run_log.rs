//! # Run History
//!
//! Durable log of finished runs (`{state_dir}/runs.json`) with rolling
//! statistics, so a trace can be mapped back to the run that touched it after
//! a restart. Same store split as the tracker: a whole-document
//! [`RunLogStore`] and one mutex per load-modify-save cycle.
//!
//! Store failures are logged and otherwise ignored; a run never fails because
//! its report could not be written.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::controller::{RunOutcome, RunReport};
use crate::error::StoreError;

/// Reports kept on disk; statistics keep counting past this.
pub const MAX_RUNS_KEPT: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub fallback_runs: u64,
    /// Iterations executed across all runs.
    pub total_iterations: u64,
    /// Mean iteration at which successful runs passed the gate.
    pub avg_iterations_to_pass: f64,
    /// `successful_runs / total_runs`, 0 when nothing ran yet.
    pub pass_rate: f64,
}

impl RunStats {
    fn add(&mut self, report: &RunReport) {
        self.total_runs += 1;
        self.total_iterations += report.iterations.len() as u64;
        match report.outcome {
            RunOutcome::Success { iteration } => {
                let prev = self.avg_iterations_to_pass * self.successful_runs as f64;
                self.successful_runs += 1;
                self.avg_iterations_to_pass = (prev + iteration as f64) / self.successful_runs as f64;
            }
            RunOutcome::Fallback { .. } => self.fallback_runs += 1,
            RunOutcome::NoCandidates { .. } | RunOutcome::Cancelled { .. } => {}
        }
        self.pass_rate = self.successful_runs as f64 / self.total_runs as f64;
    }
}

/// Oldest first on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunHistory {
    #[serde(default)]
    pub runs: Vec<RunReport>,
    #[serde(default)]
    pub statistics: RunStats,
}

pub trait RunLogStore: Send + Sync {
    fn load(&self) -> Result<RunHistory, StoreError>;
    fn save(&self, history: &RunHistory) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct JsonFileRunStore {
    path: PathBuf,
}

impl JsonFileRunStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunLogStore for JsonFileRunStore {
    fn load(&self) -> Result<RunHistory, StoreError> {
        if !self.path.exists() {
            return Ok(RunHistory::default());
        }
        let s = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&s)?)
    }

    fn save(&self, history: &RunHistory) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(history)?)?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRunStore {
    inner: Mutex<RunHistory>,
}

impl RunLogStore for MemoryRunStore {
    fn load(&self) -> Result<RunHistory, StoreError> {
        Ok(self.inner.lock().clone())
    }

    fn save(&self, history: &RunHistory) -> Result<(), StoreError> {
        *self.inner.lock() = history.clone();
        Ok(())
    }
}

pub struct RunLog {
    store: Box<dyn RunLogStore>,
    keep: usize,
    cycle: Mutex<()>,
}

impl RunLog {
    pub fn new(store: Box<dyn RunLogStore>) -> Self {
        Self::with_capacity(store, MAX_RUNS_KEPT)
    }

    pub fn with_capacity(store: Box<dyn RunLogStore>, keep: usize) -> Self {
        Self {
            store,
            keep: keep.max(1),
            cycle: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::<MemoryRunStore>::default())
    }

    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(JsonFileRunStore::new(path)))
    }

    fn load_or_empty(&self) -> RunHistory {
        self.store.load().unwrap_or_else(|e| {
            tracing::warn!(target: "run_log", error = %e, "run history unreadable; starting empty");
            RunHistory::default()
        })
    }

    /// Append one finished run, dropping the oldest reports past capacity.
    pub fn record(&self, report: &RunReport) {
        let _guard = self.cycle.lock();
        let mut history = self.load_or_empty();
        history.statistics.add(report);
        history.runs.push(report.clone());
        let excess = history.runs.len().saturating_sub(self.keep);
        history.runs.drain(..excess);
        if let Err(e) = self.store.save(&history) {
            tracing::warn!(target: "run_log", run_id = %report.run_id, error = %e, "run report not saved");
        }
    }

    pub fn last(&self) -> Option<RunReport> {
        let _guard = self.cycle.lock();
        self.load_or_empty().runs.pop()
    }

    /// Most recent first, at most `limit`, plus the running statistics.
    pub fn recent(&self, limit: usize) -> RunHistory {
        let _guard = self.cycle.lock();
        let mut history = self.load_or_empty();
        history.runs.reverse();
        history.runs.truncate(limit);
        history
    }

    pub fn stats(&self) -> RunStats {
        let _guard = self.cycle.lock();
        self.load_or_empty().statistics
    }

    /// Most recent kept run that touched `trace_id`.
    pub fn run_for_trace(&self, trace_id: &str) -> Option<RunReport> {
        let _guard = self.cycle.lock();
        self.load_or_empty()
            .runs
            .into_iter()
            .rev()
            .find(|r| r.touched_trace_ids.iter().any(|t| t == trace_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report(run_id: &str, outcome: RunOutcome, iterations: u32, touched: &[&str]) -> RunReport {
        RunReport {
            run_id: run_id.to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcome,
            iterations: (1..=iterations)
                .map(|i| crate::controller::IterationRecord {
                    iteration: i,
                    ..Default::default()
                })
                .collect(),
            touched_trace_ids: touched.iter().map(|s| s.to_string()).collect(),
            published: Vec::new(),
        }
    }

    #[test]
    fn statistics_track_pass_rate_and_iterations() {
        let log = RunLog::in_memory();
        log.record(&report("r1", RunOutcome::Success { iteration: 1 }, 1, &[]));
        log.record(&report("r2", RunOutcome::Success { iteration: 3 }, 3, &[]));
        log.record(&report(
            "r3",
            RunOutcome::Fallback {
                best_iteration: 2,
                best_review_average: 6.5,
            },
            5,
            &[],
        ));
        log.record(&report("r4", RunOutcome::NoCandidates { iteration: 1 }, 1, &[]));

        let s = log.stats();
        assert_eq!(s.total_runs, 4);
        assert_eq!(s.successful_runs, 2);
        assert_eq!(s.fallback_runs, 1);
        assert_eq!(s.total_iterations, 10);
        assert!((s.avg_iterations_to_pass - 2.0).abs() < 1e-9);
        assert!((s.pass_rate - 0.5).abs() < 1e-9);
        assert_eq!(log.last().map(|r| r.run_id), Some("r4".to_string()));
    }

    #[test]
    fn capacity_drops_oldest_but_keeps_counting() {
        let log = RunLog::with_capacity(Box::<MemoryRunStore>::default(), 2);
        for i in 0..5 {
            log.record(&report(&format!("r{i}"), RunOutcome::Cancelled { iteration: 0 }, 0, &[]));
        }
        let h = log.recent(10);
        let ids: Vec<&str> = h.runs.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, ["r4", "r3"]);
        assert_eq!(h.statistics.total_runs, 5);
        assert_eq!(h.statistics.pass_rate, 0.0);
    }

    #[test]
    fn file_store_survives_reopen_and_maps_traces_to_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/runs.json");
        {
            let log = RunLog::json_file(&path);
            log.record(&report("r1", RunOutcome::Success { iteration: 2 }, 2, &["TRG-20261019-AAAAAA-0001"]));
            log.record(&report("r2", RunOutcome::Success { iteration: 1 }, 1, &["TRG-20261019-BBBBBB-0002"]));
        }

        let reopened = RunLog::json_file(&path);
        assert_eq!(reopened.stats().total_runs, 2);
        assert_eq!(
            reopened.run_for_trace("TRG-20261019-AAAAAA-0001").map(|r| r.run_id),
            Some("r1".to_string())
        );
        assert!(reopened.run_for_trace("TRG-20261019-CCCCCC-0003").is_none());
        assert_eq!(
            reopened.recent(1).runs[0].outcome,
            RunOutcome::Success { iteration: 1 }
        );
    }

    #[test]
    fn unreadable_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");
        fs::write(&path, "{not json").unwrap();
        let log = RunLog::json_file(&path);
        assert!(log.last().is_none());
        assert_eq!(log.stats(), RunStats::default());
    }
}
