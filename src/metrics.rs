use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time series registration (so series show up on /metrics before the first run).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "pipeline_candidates_total",
            "Candidates returned by providers, before validation."
        );
        describe_counter!(
            "pipeline_invalid_total",
            "Candidates dropped at the ingest boundary (missing URL/title)."
        );
        describe_counter!(
            "pipeline_duplicates_total",
            "Candidates removed as already published or repeated in the pool."
        );
        describe_counter!("pipeline_provider_errors_total", "Provider discover() failures.");
        describe_counter!(
            "pipeline_render_fallbacks_total",
            "Items rendered with the fallback template after a generation failure."
        );
        describe_counter!("pipeline_iterations_total", "Loop iterations executed.");
        describe_counter!("pipeline_scheduled_runs_total", "Runs started by the scheduler.");
        describe_counter!("pipeline_runs_total", "Finished runs, labelled by outcome.");
        describe_counter!("pipeline_published_total", "Items delivered by the publisher.");
        describe_counter!("pipeline_publish_errors_total", "Per-item delivery failures.");
        describe_histogram!("pipeline_review_average", "Reviewer average per tested batch.");
        describe_histogram!("pipeline_test_score", "Test suite total per tested batch.");
        describe_histogram!("pipeline_feed_parse_ms", "Time spent parsing one feed document.");
        describe_counter!("pipeline_feed_http_errors_total", "Feed fetches that failed at the HTTP layer.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts when the last run finished.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Fails if a global recorder is already set.
    pub fn init() -> anyhow::Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
