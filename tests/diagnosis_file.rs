// tests/diagnosis_file.rs
//
// File-backed ledger + tracker: a full run leaves readable traces on disk and
// every touched trace diagnoses with its stages and source link.

mod common;

use common::*;
use std::sync::Arc;
use trend_gate::config::PipelineConfig;
use trend_gate::controller::{Collaborators, LoopController};
use trend_gate::diagnosis::{self, DiagnosisOutput};
use trend_gate::ingest::types::Candidate;
use trend_gate::ledger::{Ledger, Level};
use trend_gate::review::HeuristicReviewer;
use trend_gate::run_log::RunLog;
use trend_gate::tracker::NoveltyTracker;

#[test]
fn report_contains_stage_and_source_after_append() {
    let tmp = tempfile::tempdir().unwrap();
    let ledger = Ledger::file(tmp.path(), "TRG");
    let c = Candidate::new("reddit", "https://a.dev/tool?utm_source=r", "Tool", chrono::Utc::now());

    let id = ledger.mint_trace_id(&c);
    ledger.create_trace(&id, &c);
    ledger.append(&id, "selector", Level::Info, "selected", serde_json::Value::Null);

    let report = ledger.diagnose(&id);
    assert!(report.contains("selector"), "{report}");
    assert!(report.contains("Source link: https://a.dev/tool?utm_source=r"));
}

#[tokio::test]
async fn run_persists_traces_and_published_records() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig::default();
    let tracker = Arc::new(NoveltyTracker::json_file(tmp.path().join("state/published.json")));
    let ledger = Arc::new(Ledger::file(tmp.path().join("traces"), "TRG"));
    let publisher = RecordingPublisher::default();

    let ctl = LoopController::new(
        cfg,
        Collaborators {
            providers: diverse_pool(),
            generator: Box::new(StrongGenerator),
            scorer: Box::new(HeuristicReviewer),
            publisher: Box::new(publisher),
        },
        tracker,
        ledger,
    );
    let report = ctl.run().await;
    assert_eq!(report.published.len(), 5);

    // Fresh handles over the same directories see the persisted state.
    let reopened = Ledger::file(tmp.path().join("traces"), "TRG");
    for id in &report.touched_trace_ids {
        match diagnosis::diagnose(&reopened, Some(id), 10) {
            DiagnosisOutput::Report(text) => {
                assert!(text.contains("discover"));
                assert!(text.contains("publish"));
                assert!(text.contains("Source link: https://"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(reopened.list_recent(50).len(), 5);

    let tracker = NoveltyTracker::json_file(tmp.path().join("state/published.json"));
    assert_eq!(tracker.stats().total_recorded, 5);
    assert!(tracker.is_duplicate("https://twitter.example.com/llm?utm_source=x"));
}

#[test]
fn malformed_ids_are_rejected_before_touching_the_store() {
    let ledger = Ledger::in_memory();
    assert!(matches!(
        diagnosis::diagnose(&ledger, Some("../../etc/passwd"), 10),
        DiagnosisOutput::InvalidId(_)
    ));
    assert!(matches!(diagnosis::diagnose(&ledger, None, 10), DiagnosisOutput::Recent(v) if v.is_empty()));
}

#[tokio::test]
async fn configured_prefix_ids_diagnose_and_map_back_to_their_run() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = PipelineConfig::default();
    cfg.storage.state_dir = tmp.path().join("state");
    cfg.storage.trace_dir = tmp.path().join("traces");
    cfg.storage.trace_prefix = "ai-trend".into();
    let cfg = cfg.sanitized();

    let ledger = Arc::new(Ledger::file(cfg.storage.trace_dir.clone(), cfg.storage.trace_prefix.clone()));
    let runs = Arc::new(RunLog::json_file(cfg.storage.runs_path()));
    let ctl = LoopController::new(
        cfg.clone(),
        Collaborators {
            providers: diverse_pool(),
            generator: Box::new(StrongGenerator),
            scorer: Box::new(HeuristicReviewer),
            publisher: Box::new(RecordingPublisher::default()),
        },
        Arc::new(NoveltyTracker::json_file(cfg.storage.published_path())),
        ledger,
    )
    .with_run_log(runs);
    let report = ctl.run().await;
    assert!(!report.touched_trace_ids.is_empty());

    let reopened = Ledger::file(cfg.storage.trace_dir.clone(), "ignored");
    let history = RunLog::json_file(cfg.storage.runs_path());
    for id in &report.touched_trace_ids {
        assert!(id.starts_with("AITREND-"), "{id}");
        match diagnosis::diagnose(&reopened, Some(id), 10) {
            DiagnosisOutput::Report(text) => {
                assert!(text.contains(&format!("Runs:     {}", report.run_id)), "{text}");
            }
            other => panic!("unexpected {other:?}"),
        }
        let rec = reopened.get(id).expect("stored");
        let discover = rec.logs.iter().find(|l| l.module == "discover").expect("discover entry");
        assert_eq!(discover.data["run_id"], report.run_id.as_str());
        assert_eq!(history.run_for_trace(id).map(|r| r.run_id), Some(report.run_id.clone()));
    }

    let partitions: Vec<String> = std::fs::read_dir(&cfg.storage.trace_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(!partitions.iter().any(|p| p == "unknown"), "{partitions:?}");

    let stats = history.stats();
    assert_eq!(stats.total_runs, 1);
    assert_eq!(stats.successful_runs, 1);
    assert_eq!(stats.pass_rate, 1.0);
}
