//! # Loop Controller
//!
//! `COLLECT → DEDUPE → SELECT → RENDER → TEST+REVIEW → DECIDE →
//! {DEPLOY_SUCCESS | OPTIMIZE→COLLECT | DEPLOY_FALLBACK}`
//!
//! One `run` owns its own [`RunContext`] (trace ids, hints, best batch), so
//! runs never share mutable state except the tracker and ledger stores.
//! Every run ends in exactly one [`RunOutcome`].

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::config::PipelineConfig;
use crate::engine::{self, GateDecision, HintInputs, OptimizationHints};
use crate::ingest::{self, types::Candidate, types::SourceProvider};
use crate::ledger::{Ledger, Level};
use crate::publish::{PublishOutcome, Publisher};
use crate::quality::narrative::{self, RepeatedPair};
use crate::quality::{FullTestResult, TestSuite};
use crate::render::{self, Generator, RenderedItem};
use crate::review::{self, BatchReview, Scorer};
use crate::run_log::RunLog;
use crate::selector::{SelectParams, Selector};
use crate::tracker::NoveltyTracker;

/* ----------------------------
Cancellation and external review
---------------------------- */

/// Cooperative cancellation, honored at iteration boundaries only.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approve,
    Reject { reason: String },
}

/// Sent when a batch cleared the automated gate and an external review
/// channel is configured. Dropping `respond` falls back to the automated verdict.
#[derive(Debug)]
pub struct ReviewRequest {
    pub run_id: String,
    pub iteration: u32,
    pub items: Vec<RenderedItem>,
    pub test_score: f64,
    pub review_average: f64,
    pub respond: oneshot::Sender<ReviewVerdict>,
}

/* ----------------------------
Run report
---------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The gate was met and the batch deployed.
    Success { iteration: u32 },
    /// Budget exhausted; the best batch seen was deployed.
    Fallback {
        best_iteration: u32,
        best_review_average: f64,
    },
    /// An iteration found nothing novel to work with.
    NoCandidates { iteration: u32 },
    /// Stopped at an iteration boundary on request.
    Cancelled { iteration: u32 },
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Success { .. } => "success",
            RunOutcome::Fallback { .. } => "fallback",
            RunOutcome::NoCandidates { .. } => "no_candidates",
            RunOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationRecord {
    pub iteration: u32,
    pub collected: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub provider_errors: usize,
    pub selected: usize,
    pub providers: Vec<String>,
    pub rendered: usize,
    pub fallbacks: usize,
    pub test_score: f64,
    pub test_passed: bool,
    pub review_average: f64,
    pub review_passed: bool,
    pub repeated_narratives: usize,
    pub warning: Option<String>,
    pub decision: Option<GateDecision>,
    pub external_verdict: Option<ReviewVerdict>,
    pub hints: Option<OptimizationHints>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub iterations: Vec<IterationRecord>,
    /// Every trace id the run created or logged to, in first-touch order.
    pub touched_trace_ids: Vec<String>,
    pub published: Vec<PublishOutcome>,
}

/* ----------------------------
Per-run context
---------------------------- */

struct BestBatch {
    iteration: u32,
    review_average: f64,
    items: Vec<RenderedItem>,
}

struct RunContext {
    run_id: String,
    /// identity (canonical URL) → trace id, stable across iterations.
    trace_ids: HashMap<String, String>,
    touched: Vec<String>,
    touched_set: HashSet<String>,
    hints: OptimizationHints,
    best: Option<BestBatch>,
    iterations: Vec<IterationRecord>,
}

impl RunContext {
    fn new() -> Self {
        let suffix: u16 = rand::rng().random();
        Self {
            run_id: format!("run-{}-{:04X}", Utc::now().format("%Y%m%dT%H%M%S"), suffix),
            trace_ids: HashMap::new(),
            touched: Vec::new(),
            touched_set: HashSet::new(),
            hints: OptimizationHints::default(),
            best: None,
            iterations: Vec::new(),
        }
    }

    fn touch(&mut self, trace_id: &str) {
        if !trace_id.is_empty() && self.touched_set.insert(trace_id.to_string()) {
            self.touched.push(trace_id.to_string());
        }
    }
}

/* ----------------------------
Controller
---------------------------- */

/// External collaborators the loop drives.
pub struct Collaborators {
    pub providers: Vec<Box<dyn SourceProvider>>,
    pub generator: Box<dyn Generator>,
    pub scorer: Box<dyn Scorer>,
    pub publisher: Box<dyn Publisher>,
}

pub struct LoopController {
    cfg: PipelineConfig,
    collab: Collaborators,
    tracker: Arc<NoveltyTracker>,
    ledger: Arc<Ledger>,
    selector: Selector,
    suite: TestSuite,
    review_tx: Option<mpsc::Sender<ReviewRequest>>,
    cancel: CancelHandle,
    run_log: Arc<RunLog>,
}

impl LoopController {
    pub fn new(
        cfg: PipelineConfig,
        collab: Collaborators,
        tracker: Arc<NoveltyTracker>,
        ledger: Arc<Ledger>,
    ) -> Self {
        let selector = Selector::new(cfg.providers.clone());
        let suite = TestSuite::new(cfg.quality.clone());
        Self {
            cfg,
            collab,
            tracker,
            ledger,
            selector,
            suite,
            review_tx: None,
            cancel: CancelHandle::new(),
            run_log: Arc::new(RunLog::in_memory()),
        }
    }

    /// Route gate-passing batches through an external reviewer before deploy.
    pub fn with_review_channel(mut self, tx: mpsc::Sender<ReviewRequest>) -> Self {
        self.review_tx = Some(tx);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Where finished runs are recorded (in-memory unless replaced).
    pub fn with_run_log(mut self, run_log: Arc<RunLog>) -> Self {
        self.run_log = run_log;
        self
    }

    pub fn run_log(&self) -> &Arc<RunLog> {
        &self.run_log
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn tracker(&self) -> &Arc<NoveltyTracker> {
        &self.tracker
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub async fn run(&self) -> RunReport {
        crate::metrics::ensure_described();
        let started_at = Utc::now();
        let mut ctx = RunContext::new();
        tracing::info!(target: "controller", run_id = %ctx.run_id, max_iterations = self.cfg.max_iterations, "run started");

        let mut published = Vec::new();
        let mut outcome = None;

        for iteration in 1..=self.cfg.max_iterations {
            if self.cancel.is_cancelled() {
                outcome = Some(RunOutcome::Cancelled {
                    iteration: iteration - 1,
                });
                break;
            }
            counter!("pipeline_iterations_total").increment(1);

            match self.iterate(&mut ctx, iteration).await {
                Step::Deploy(items) => {
                    published = self.deploy(&mut ctx, &items, "success").await;
                    outcome = Some(RunOutcome::Success { iteration });
                    break;
                }
                Step::Exhausted => {
                    outcome = Some(match ctx.best.take() {
                        Some(best) => {
                            published = self.deploy(&mut ctx, &best.items, "fallback").await;
                            RunOutcome::Fallback {
                                best_iteration: best.iteration,
                                best_review_average: best.review_average,
                            }
                        }
                        None => RunOutcome::NoCandidates { iteration },
                    });
                    break;
                }
                Step::Continue => {}
            }

            if iteration == self.cfg.max_iterations {
                outcome = Some(match ctx.best.take() {
                    Some(best) => {
                        tracing::warn!(target: "controller", run_id = %ctx.run_id, best_iteration = best.iteration, score = best.review_average, "iteration budget exhausted; deploying best batch");
                        published = self.deploy(&mut ctx, &best.items, "fallback").await;
                        RunOutcome::Fallback {
                            best_iteration: best.iteration,
                            best_review_average: best.review_average,
                        }
                    }
                    None => RunOutcome::NoCandidates { iteration },
                });
            }
        }

        // max_iterations >= 1 after sanitizing; this only covers a hand-built zero.
        let outcome = outcome.unwrap_or(RunOutcome::NoCandidates { iteration: 0 });

        counter!("pipeline_runs_total", "outcome" => outcome.label()).increment(1);
        gauge!("pipeline_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "controller",
            run_id = %ctx.run_id,
            outcome = outcome.label(),
            iterations = ctx.iterations.len(),
            published = crate::publish::success_count(&published),
            "run finished"
        );

        let report = RunReport {
            run_id: ctx.run_id,
            started_at,
            finished_at: Utc::now(),
            outcome,
            iterations: ctx.iterations,
            touched_trace_ids: ctx.touched,
            published,
        };
        self.run_log.record(&report);
        report
    }

    async fn iterate(&self, ctx: &mut RunContext, iteration: u32) -> Step {
        let now = Utc::now();
        let mut rec = IterationRecord {
            iteration,
            ..Default::default()
        };

        // COLLECT
        let (intake, provider_errors) = ingest::run_once(&self.collab.providers).await;
        rec.collected = intake.candidates.len();
        rec.invalid = intake.invalid;
        rec.provider_errors = provider_errors.len();
        let mut pool = intake.candidates;
        for c in pool.iter_mut() {
            c.provider = self.selector.weights().canonical(&c.provider);
            self.assign_trace(ctx, c, iteration);
        }

        // DEDUPE
        let (fresh, dups) = self.tracker.partition_new_at(pool, now);
        rec.duplicates = intake.pool_duplicates + dups.len();
        counter!("pipeline_duplicates_total").increment(dups.len() as u64);
        for d in &dups {
            self.log(ctx, d.trace_id().unwrap_or_default(), "tracker", Level::Info, "already published within window", serde_json::json!({ "iteration": iteration }));
        }

        if fresh.is_empty() {
            tracing::warn!(target: "controller", run_id = %ctx.run_id, iteration, "no novel candidates");
            ctx.iterations.push(rec);
            return Step::Exhausted;
        }

        // SELECT
        let cap = ctx
            .hints
            .per_provider_cap
            .map_or(self.cfg.per_provider_cap, |c| c.min(self.cfg.per_provider_cap));
        let demoted: HashSet<String> = ctx.hints.demoted.iter().cloned().collect();
        let selection = self.selector.select_at(
            fresh,
            SelectParams {
                target_count: self.cfg.target_count,
                per_provider_cap: cap,
            },
            &demoted,
            now,
        );
        rec.selected = selection.len();
        rec.warning = selection.warning.clone();
        for sc in &selection.items {
            let id = sc.candidate.trace_id().unwrap_or_default().to_string();
            self.log(ctx, &id, "selector", Level::Info, "selected into batch", serde_json::json!({ "iteration": iteration, "heat": sc.heat, "cap": cap }));
        }
        let mut providers: Vec<String> = selection.candidates().map(|c| c.provider.clone()).collect();
        providers.sort();
        providers.dedup();
        rec.providers = providers;

        // RENDER
        let rendered = render::render_batch(
            self.collab.generator.as_ref(),
            selection.into_candidates(),
            &ctx.hints,
            self.cfg.render_fallback,
        )
        .await;
        rec.fallbacks = rendered.fallbacks.len();
        for e in &rendered.fallbacks {
            if let crate::error::PipelineError::Render { trace_id, message } = e {
                self.log(ctx, trace_id, "render", Level::Warning, "generation failed; fallback rendering used", serde_json::json!({ "error": message }));
            }
        }
        for e in &rendered.dropped {
            if let crate::error::PipelineError::Render { trace_id, message } = e {
                self.log(ctx, trace_id, "render", Level::Error, "generation failed; item dropped", serde_json::json!({ "error": message }));
            }
        }
        let items = rendered.items;
        rec.rendered = items.len();
        for it in &items {
            self.log(ctx, it.trace_id(), "render", Level::Info, "rendered", serde_json::json!({ "iteration": iteration, "chars": it.text.chars().count(), "fallback": it.fallback }));
        }

        // TEST + REVIEW (independent)
        let (test, review) = tokio::join!(
            async { self.suite.run_full_test(&items) },
            review::review_batch(self.collab.scorer.as_ref(), &items)
        );
        let texts: Vec<&str> = items.iter().map(|i| i.text.as_str()).collect();
        let repeated = narrative::repeated_pairs(
            &texts,
            narrative::DEFAULT_PREFIX_CHARS,
            narrative::DEFAULT_SIMILARITY,
        );
        self.log_evaluation(ctx, iteration, &items, &test, &review, &repeated);

        rec.test_score = test.total_score;
        rec.test_passed = test.passed;
        rec.review_average = review.average;
        rec.review_passed = !review.items.is_empty() && review.average >= self.cfg.review_threshold;
        rec.repeated_narratives = repeated.len();
        histogram!("pipeline_test_score").record(test.total_score);
        histogram!("pipeline_review_average").record(review.average);

        // Running maximum by reviewer average.
        let better = ctx
            .best
            .as_ref()
            .is_none_or(|b| review.average > b.review_average);
        if !items.is_empty() && better {
            ctx.best = Some(BestBatch {
                iteration,
                review_average: review.average,
                items: items.clone(),
            });
        }

        // DECIDE
        let mut decision = engine::decide(&test, &review, self.cfg.review_threshold);
        let mut rejection = None;
        if decision.passed() {
            if let Some(verdict) = self
                .await_external_review(ctx, iteration, &items, &test, &review)
                .await
            {
                if let ReviewVerdict::Reject { reason } = &verdict {
                    decision = GateDecision::Fail {
                        reasons: vec![format!("external review rejected: {reason}")],
                    };
                    rejection = Some(reason.clone());
                }
                rec.external_verdict = Some(verdict);
            }
        }

        tracing::info!(
            target: "controller",
            run_id = %ctx.run_id,
            iteration,
            score = review.average,
            test_score = test.total_score,
            passed = decision.passed(),
            "iteration decided"
        );
        rec.decision = Some(decision.clone());

        if decision.passed() {
            ctx.iterations.push(rec);
            return Step::Deploy(items);
        }

        // OPTIMIZE
        let mut hints = engine::extract_hints(&HintInputs {
            test: &test,
            review: &review,
            items: &items,
            repeated: &repeated,
            review_threshold: self.cfg.review_threshold,
            target_count: self.cfg.target_count,
            max_provider_share: self.cfg.quality.max_provider_share,
        });
        if let Some(reason) = rejection {
            hints.strategies.push(format!("Reviewer feedback: {reason}"));
        }
        rec.hints = Some(hints.clone());
        ctx.hints = hints;
        ctx.iterations.push(rec);
        Step::Continue
    }

    fn assign_trace(&self, ctx: &mut RunContext, c: &mut Candidate, iteration: u32) {
        let key = c.identity().to_string();
        let (id, fresh) = match ctx.trace_ids.get(&key) {
            Some(id) => (id.clone(), false),
            None => {
                let id = self.ledger.mint_trace_id(c);
                self.ledger.create_trace(&id, c);
                ctx.trace_ids.insert(key, id.clone());
                (id, true)
            }
        };
        c.assign_trace_id(id.clone());
        let (level, msg) = if fresh {
            (Level::Info, "discovered")
        } else {
            (Level::Debug, "rediscovered")
        };
        self.log(ctx, &id, "discover", level, msg, serde_json::json!({ "provider": c.provider, "iteration": iteration }));
    }

    fn log(
        &self,
        ctx: &mut RunContext,
        trace_id: &str,
        stage: &str,
        level: Level,
        message: &str,
        data: serde_json::Value,
    ) {
        if trace_id.is_empty() {
            return;
        }
        ctx.touch(trace_id);
        let data = with_run_id(data, &ctx.run_id);
        self.ledger.append(trace_id, stage, level, message, data);
    }

    fn log_evaluation(
        &self,
        ctx: &mut RunContext,
        iteration: u32,
        items: &[RenderedItem],
        test: &FullTestResult,
        review: &BatchReview,
        repeated: &[RepeatedPair],
    ) {
        for (it, r) in items.iter().zip(&review.items) {
            self.log(ctx, it.trace_id(), "quality", Level::Info, "batch tested", serde_json::json!({
                "iteration": iteration,
                "total_score": test.total_score,
                "passed": test.passed,
            }));
            self.log(ctx, it.trace_id(), "review", Level::Info, "reviewed", serde_json::json!({
                "iteration": iteration,
                "score": r.result.total,
                "weaknesses": r.result.weaknesses,
            }));
        }
        for p in repeated {
            for idx in [p.first, p.second] {
                if let Some(it) = items.get(idx) {
                    self.log(ctx, it.trace_id(), "quality", Level::Warning, "repeated narrative within batch", serde_json::json!({
                        "iteration": iteration,
                        "similarity": p.similarity,
                    }));
                }
            }
        }
    }

    /// Suspension point: `None` when no channel is configured.
    async fn await_external_review(
        &self,
        ctx: &mut RunContext,
        iteration: u32,
        items: &[RenderedItem],
        test: &FullTestResult,
        review: &BatchReview,
    ) -> Option<ReviewVerdict> {
        let tx = self.review_tx.as_ref()?;
        for it in items {
            self.log(ctx, it.trace_id(), "external_review", Level::Info, "awaiting external review", serde_json::json!({ "iteration": iteration }));
        }

        let (respond, verdict_rx) = oneshot::channel();
        let req = ReviewRequest {
            run_id: ctx.run_id.clone(),
            iteration,
            items: items.to_vec(),
            test_score: test.total_score,
            review_average: review.average,
            respond,
        };
        let verdict = if tx.send(req).await.is_err() {
            tracing::warn!(target: "controller", run_id = %ctx.run_id, "review channel closed; using automated verdict");
            ReviewVerdict::Approve
        } else {
            verdict_rx.await.unwrap_or_else(|_| {
                tracing::warn!(target: "controller", run_id = %ctx.run_id, "reviewer dropped the request; using automated verdict");
                ReviewVerdict::Approve
            })
        };

        let (level, msg) = match &verdict {
            ReviewVerdict::Approve => (Level::Info, "external review approved".to_string()),
            ReviewVerdict::Reject { reason } => (Level::Warning, format!("external review rejected: {reason}")),
        };
        for it in items {
            self.log(ctx, it.trace_id(), "external_review", level, &msg, serde_json::Value::Null);
        }
        Some(verdict)
    }

    /// Publish, then record only the delivered items with the tracker and ledger.
    async fn deploy(&self, ctx: &mut RunContext, items: &[RenderedItem], mode: &str) -> Vec<PublishOutcome> {
        let outcomes = self.collab.publisher.publish_batch(items).await;

        let delivered: Vec<Candidate> = items
            .iter()
            .zip(&outcomes)
            .filter(|(_, o)| o.success)
            .map(|(it, _)| it.candidate.clone())
            .collect();
        let recorded = self.tracker.record_published(&delivered);

        for (it, o) in items.iter().zip(&outcomes) {
            ctx.touch(it.trace_id());
            self.ledger.set_final_output(it.trace_id(), &it.text);
            self.ledger
                .record_publish(it.trace_id(), self.collab.publisher.name(), o.success, &o.response);
        }

        tracing::info!(
            target: "publish",
            run_id = %ctx.run_id,
            mode,
            attempted = items.len(),
            delivered = delivered.len(),
            recorded,
            "batch deployed"
        );
        outcomes
    }
}

/// Tag ledger data with the run so a trace can be mapped back to it.
fn with_run_id(data: serde_json::Value, run_id: &str) -> serde_json::Value {
    match data {
        serde_json::Value::Object(mut m) => {
            m.insert("run_id".into(), run_id.into());
            serde_json::Value::Object(m)
        }
        serde_json::Value::Null => serde_json::json!({ "run_id": run_id }),
        other => serde_json::json!({ "run_id": run_id, "value": other }),
    }
}

enum Step {
    Continue,
    Deploy(Vec<RenderedItem>),
    /// Nothing novel this iteration: stop, deploying the best batch if any.
    Exhausted,
}
