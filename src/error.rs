//! Error taxonomy shared across the pipeline.
//!
//! Gate failures are not errors: a batch that misses the quality bar is a normal
//! outcome (`engine::GateDecision`), so it does not appear here.

use thiserror::Error;

/// Failure of one of the persisted stores (published records, trace ledger).
///
/// Callers in the pipeline never bubble these up: the tracker degrades to
/// "assume empty" and the ledger to "skip logging".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-item or per-collaborator failures observed while running a cycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// One provider failed; siblings are unaffected.
    #[error("provider `{provider}` failed: {message}")]
    Provider { provider: String, message: String },

    /// Generation failed for one candidate.
    #[error("render failed for {trace_id}: {message}")]
    Render { trace_id: String, message: String },

    /// A candidate violated a boundary invariant and was dropped.
    #[error("invalid candidate: {0}")]
    Validation(String),

    /// Delivery of one item failed; siblings are unaffected.
    #[error("publish failed for {trace_id}: {message}")]
    Publish { trace_id: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Short machine-friendly kind, used as a ledger/metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Provider { .. } => "provider",
            PipelineError::Render { .. } => "render",
            PipelineError::Validation(_) => "validation",
            PipelineError::Publish { .. } => "publish",
            PipelineError::Store(_) => "store",
        }
    }
}
