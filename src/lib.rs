// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod controller;
pub mod diagnosis;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod metrics;
pub mod provider_weights;
pub mod publish;
pub mod quality;
pub mod render;
pub mod review;
pub mod run_log;
pub mod selector;
pub mod tracker;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::controller::{
    CancelHandle, Collaborators, LoopController, ReviewRequest, ReviewVerdict, RunOutcome,
    RunReport,
};
pub use crate::error::{PipelineError, StoreError};
