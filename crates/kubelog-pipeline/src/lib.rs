//! kubelog Pipeline
//!
//! Bounded ingestion pipeline that decouples file-change processing from the
//! single writer feeding the log cache.

pub mod pipeline;

pub use pipeline::{IngestionPipeline, PipelineStats, DEFAULT_QUEUE_CAPACITY};
