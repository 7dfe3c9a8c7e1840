//! Publish collaborators. Delivery is per item: one failure never blocks siblings.

pub mod console;
pub mod discord;

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::render::RenderedItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub trace_id: String,
    pub url: String,
    pub success: bool,
    /// Response text on success, error text on failure.
    pub response: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver one item; the returned string is recorded as the response.
    async fn publish(&self, item: &RenderedItem) -> Result<String>;

    fn name(&self) -> &str;

    /// Deliver items in order, collecting per-item outcomes.
    async fn publish_batch(&self, items: &[RenderedItem]) -> Vec<PublishOutcome> {
        let mut out = Vec::with_capacity(items.len());
        for it in items {
            let outcome = match self.publish(it).await {
                Ok(response) => {
                    counter!("pipeline_published_total").increment(1);
                    PublishOutcome {
                        trace_id: it.trace_id().to_string(),
                        url: it.candidate.url.clone(),
                        success: true,
                        response,
                    }
                }
                Err(e) => {
                    counter!("pipeline_publish_errors_total").increment(1);
                    let err = PipelineError::Publish {
                        trace_id: it.trace_id().to_string(),
                        message: format!("{e:#}"),
                    };
                    tracing::warn!(target: "publish", publisher = self.name(), error = %err, "publish failed");
                    PublishOutcome {
                        trace_id: it.trace_id().to_string(),
                        url: it.candidate.url.clone(),
                        success: false,
                        response: format!("{e:#}"),
                    }
                }
            };
            out.push(outcome);
        }
        out
    }
}

/// Count of successful outcomes.
pub fn success_count(outcomes: &[PublishOutcome]) -> usize {
    outcomes.iter().filter(|o| o.success).count()
}
