//! Trend gate service entrypoint.
//! Boots the HTTP diagnosis surface and, when enabled, the scheduled pipeline.

use shuttle_axum::ShuttleAxum;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trend_gate::api::{self, AppState};
use trend_gate::config::PipelineConfig;
use trend_gate::ingest::providers::RssProvider;
use trend_gate::ingest::scheduler::{spawn_scheduler, SchedulerCfg};
use trend_gate::ingest::types::SourceProvider;
use trend_gate::ledger::Ledger;
use trend_gate::metrics::Metrics;
use trend_gate::publish::{console::ConsolePublisher, discord::DiscordForumPublisher, Publisher};
use trend_gate::render::{Generator, OpenAiGenerator, SummaryGenerator};
use trend_gate::review::HeuristicReviewer;
use trend_gate::run_log::RunLog;
use trend_gate::tracker::NoveltyTracker;
use trend_gate::{Collaborators, LoopController};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - TREND_GATE_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("TREND_GATE_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("controller=info,ingest=info,publish=info,warn"));

    // TREND_GATE_LOG_FORMAT=json switches to one JSON object per line.
    let json = std::env::var("TREND_GATE_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

fn build_generator() -> Box<dyn Generator> {
    match OpenAiGenerator::from_env() {
        Ok(g) => Box::new(g),
        Err(e) => {
            tracing::info!(error = %e, "OpenAI generator unavailable; using offline summaries");
            Box::new(SummaryGenerator)
        }
    }
}

fn build_publisher() -> Box<dyn Publisher> {
    match DiscordForumPublisher::from_env() {
        Ok(p) => Box::new(p),
        Err(_) => {
            tracing::info!("DISCORD_WEBHOOK_URL not set; publishing to the log only");
            Box::new(ConsolePublisher)
        }
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    enable_dev_tracing();

    let cfg = PipelineConfig::load_default()
        .map_err(|e| shuttle_runtime::Error::Custom(e.context("loading pipeline config")))?;

    let tracker = Arc::new(NoveltyTracker::json_file(cfg.storage.published_path()));
    let ledger = Arc::new(Ledger::file(
        cfg.storage.trace_dir.clone(),
        cfg.storage.trace_prefix.clone(),
    ));
    let run_log = Arc::new(RunLog::json_file(cfg.storage.runs_path()));

    let metrics = Metrics::init().map_err(shuttle_runtime::Error::Custom)?;

    if cfg.scheduler.enabled {
        let providers: Vec<Box<dyn SourceProvider>> = cfg
            .feeds
            .iter()
            .map(|f| Box::new(RssProvider::from_url(f.provider.clone(), f.url.clone())) as Box<dyn SourceProvider>)
            .collect();
        if providers.is_empty() {
            tracing::warn!("scheduler enabled but no feeds configured");
        }

        let sched = SchedulerCfg {
            interval_secs: cfg.scheduler.interval_secs,
        };
        let controller = LoopController::new(
            cfg,
            Collaborators {
                providers,
                generator: build_generator(),
                scorer: Box::new(HeuristicReviewer),
                publisher: build_publisher(),
            },
            tracker.clone(),
            ledger.clone(),
        )
        .with_run_log(run_log.clone());
        let _handle = spawn_scheduler(sched, Arc::new(controller));
        tracing::info!(interval_secs = sched.interval_secs, "pipeline scheduler started");
    }

    let state = AppState::new(ledger, tracker, run_log);
    let app = api::router(state).merge(metrics.router());

    Ok(app.into())
}
