use anyhow::Result;
use async_trait::async_trait;

use super::Publisher;
use crate::render::RenderedItem;

/// Dry-run publisher: logs each item instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct ConsolePublisher;

#[async_trait]
impl Publisher for ConsolePublisher {
    async fn publish(&self, item: &RenderedItem) -> Result<String> {
        tracing::info!(
            target: "publish",
            trace_id = item.trace_id(),
            provider = %item.candidate.provider,
            title = %item.candidate.title,
            chars = item.text.chars().count(),
            "dry-run publish"
        );
        Ok("logged".to_string())
    }

    fn name(&self) -> &str {
        "console"
    }
}
