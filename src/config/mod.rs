pub mod pipeline;

pub use pipeline::{FeedConfig, PipelineConfig, SchedulerConfig, StorageConfig};
