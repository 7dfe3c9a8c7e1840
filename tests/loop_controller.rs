// tests/loop_controller.rs
//
// End-to-end runs of the loop with in-memory stores and fake collaborators.
//
// Covered:
// - success on the first iteration
// - fallback after the iteration budget (two providers, weak prose)
// - nothing published twice inside the window across runs
// - no candidates / provider failure isolation
// - partial publish failure only records delivered items

mod common;

use common::*;
use trend_gate::config::PipelineConfig;
use trend_gate::ledger::TraceStatus;
use trend_gate::RunOutcome;

#[tokio::test]
async fn diverse_strong_batch_succeeds_on_first_iteration() {
    let h = Harness::new();
    let ctl = h.controller(diverse_pool(), Box::new(StrongGenerator));

    let report = ctl.run().await;

    assert_eq!(report.outcome, RunOutcome::Success { iteration: 1 });
    assert_eq!(report.iterations.len(), 1);
    let it = &report.iterations[0];
    assert!(it.test_passed, "{it:?}");
    assert!(it.review_passed);
    assert_eq!(it.selected, 5);
    assert_eq!(h.delivered_urls().len(), 5);
    assert_eq!(h.tracker.stats().total_recorded, 5);

    for id in &report.touched_trace_ids {
        let rec = h.ledger.get(id).expect("touched trace exists");
        assert_eq!(rec.status, TraceStatus::Completed);
        assert!(rec.final_output.is_some());
    }
}

#[tokio::test]
async fn weak_batches_exhaust_budget_and_deploy_best() {
    let h = Harness::new();
    let ctl = h.controller(two_provider_pool(), Box::new(WeakGenerator));

    let report = ctl.run().await;

    assert_eq!(report.iterations.len(), 5);
    match &report.outcome {
        RunOutcome::Fallback { best_iteration, .. } => assert_eq!(*best_iteration, 1),
        other => panic!("expected fallback, got {other:?}"),
    }
    // Two providers with a cap of two per provider.
    assert_eq!(report.iterations[0].selected, 4);
    assert!(report.iterations[0].warning.is_some());
    assert!(report.iterations.iter().all(|i| !i.test_passed));
    assert!(report.iterations[0].hints.as_ref().is_some_and(|h| !h.top_issues.is_empty()));

    let urls = h.delivered_urls();
    assert_eq!(urls.len(), 4);
    for url in &urls {
        assert!(h.tracker.is_duplicate(url), "{url} should be recorded");
    }
    for p in &report.published {
        let rec = h.ledger.get(&p.trace_id).expect("trace");
        assert_eq!(rec.status, TraceStatus::Completed);
    }
}

#[tokio::test]
async fn trace_ids_are_stable_across_iterations() {
    let h = Harness::new();
    let ctl = h.controller(two_provider_pool(), Box::new(WeakGenerator));

    let report = ctl.run().await;

    // Ten candidates, re-collected five times, one trace each.
    assert_eq!(report.touched_trace_ids.len(), 10);
    let rec = h.ledger.get(&report.touched_trace_ids[0]).expect("trace");
    let discover_lines = rec.logs.iter().filter(|l| l.module == "discover").count();
    assert_eq!(discover_lines, 5);
}

#[tokio::test]
async fn published_items_are_never_republished_within_window() {
    let h = Harness::new();

    let first = h.controller(two_provider_pool(), Box::new(WeakGenerator)).run().await;
    let second = h.controller(two_provider_pool(), Box::new(WeakGenerator)).run().await;
    let third = h.controller(two_provider_pool(), Box::new(WeakGenerator)).run().await;
    let fourth = h.controller(two_provider_pool(), Box::new(WeakGenerator)).run().await;

    assert!(matches!(first.outcome, RunOutcome::Fallback { .. }));
    assert!(matches!(second.outcome, RunOutcome::Fallback { .. }));
    assert!(matches!(third.outcome, RunOutcome::Fallback { .. }));
    assert_eq!(fourth.outcome, RunOutcome::NoCandidates { iteration: 1 });

    let mut urls = h.delivered_urls();
    assert_eq!(urls.len(), 10);
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 10, "an item was published twice");
    assert_eq!(second.iterations[0].duplicates, 4);
}

#[tokio::test]
async fn empty_pool_ends_with_no_candidates() {
    let h = Harness::new();
    let ctl = h.controller(vec![FixedProvider::boxed("reddit", vec![])], Box::new(StrongGenerator));

    let report = ctl.run().await;

    assert_eq!(report.outcome, RunOutcome::NoCandidates { iteration: 1 });
    assert_eq!(report.iterations.len(), 1);
    assert!(report.published.is_empty());
}

#[tokio::test]
async fn failing_provider_does_not_block_siblings() {
    let h = Harness::new();
    let mut providers = diverse_pool();
    providers.insert(0, Box::new(FailingProvider));
    let ctl = h.controller(providers, Box::new(StrongGenerator));

    let report = ctl.run().await;

    assert_eq!(report.outcome, RunOutcome::Success { iteration: 1 });
    assert_eq!(report.iterations[0].provider_errors, 1);
}

#[tokio::test]
async fn only_delivered_items_are_recorded() {
    let mut h = Harness::new();
    h.publisher.fail_marker = Some("/cli".to_string());
    let ctl = h.controller(diverse_pool(), Box::new(StrongGenerator));

    let report = ctl.run().await;

    assert_eq!(report.outcome, RunOutcome::Success { iteration: 1 });
    assert_eq!(trend_gate::publish::success_count(&report.published), 4);
    assert!(!h.tracker.is_duplicate("https://hackernews.example.com/cli"));

    let failed = report.published.iter().find(|p| !p.success).expect("one failure");
    let rec = h.ledger.get(&failed.trace_id).expect("trace");
    assert_eq!(rec.status, TraceStatus::Failed);
}

#[tokio::test]
async fn single_iteration_budget_still_deploys() {
    let h = Harness::new();
    let cfg = PipelineConfig {
        max_iterations: 1,
        ..Default::default()
    };
    let ctl = h.controller_with(cfg, two_provider_pool(), Box::new(WeakGenerator));

    let report = ctl.run().await;

    assert_eq!(report.iterations.len(), 1);
    assert!(matches!(report.outcome, RunOutcome::Fallback { best_iteration: 1, .. }));
    assert_eq!(report.published.len(), 4);
}
