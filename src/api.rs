use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::controller::RunReport;
use crate::diagnosis::{self, DiagnosisOutput};
use crate::ledger::{Ledger, TraceSummary};
use crate::run_log::{RunHistory, RunLog};
use crate::tracker::{NoveltyTracker, TrackerStats};

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    ledger: Arc<Ledger>,
    tracker: Arc<NoveltyTracker>,
    run_log: Arc<RunLog>,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>, tracker: Arc<NoveltyTracker>, run_log: Arc<RunLog>) -> Self {
        Self {
            ledger,
            tracker,
            run_log,
        }
    }

    /// Fresh in-memory stores; mostly for tests and dry runs.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(Ledger::in_memory()),
            Arc::new(NoveltyTracker::in_memory()),
            Arc::new(RunLog::in_memory()),
        )
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn tracker(&self) -> &Arc<NoveltyTracker> {
        &self.tracker
    }

    pub fn run_log(&self) -> &Arc<RunLog> {
        &self.run_log
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/traces", get(list_traces))
        .route("/traces/{id}", get(get_trace))
        .route("/traces/{id}/diagnose", get(diagnose_trace))
        .route("/published/stats", get(published_stats))
        .route("/runs", get(list_runs))
        .route("/runs/last", get(last_run))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct ListQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_traces(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Json<Vec<TraceSummary>> {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    Json(state.ledger.list_recent(limit))
}

async fn get_trace(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.ledger.get(&id) {
        Some(rec) => Json(rec).into_response(),
        None => (StatusCode::NOT_FOUND, format!("trace {id} not found")).into_response(),
    }
}

async fn diagnose_trace(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match diagnosis::diagnose(&state.ledger, Some(&id), DEFAULT_LIMIT) {
        DiagnosisOutput::Report(text) => text.into_response(),
        DiagnosisOutput::InvalidId(id) => {
            (StatusCode::BAD_REQUEST, format!("malformed trace id: {id}")).into_response()
        }
        DiagnosisOutput::Recent(rows) => diagnosis::format_recent(&rows).into_response(),
    }
}

async fn published_stats(State(state): State<AppState>) -> Json<TrackerStats> {
    Json(state.tracker.stats())
}

async fn list_runs(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Json<RunHistory> {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    Json(state.run_log.recent(limit))
}

async fn last_run(State(state): State<AppState>) -> Json<Option<RunReport>> {
    Json(state.run_log.last())
}
