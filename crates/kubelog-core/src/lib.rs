//! kubelog Core
//!
//! Core types, traits, and configuration for the kubelog tailing agent.

pub mod config;
pub mod error;
pub mod log_entry;
pub mod traits;

// Re-export commonly used types
pub use config::Config;
pub use error::{CacheError, IngestionError, KubeLogError, Result};
pub use log_entry::{RawLogEntry, StructuredLogEntry, TimeRange};
pub use traits::{LogCache, NullSink, TailEvent, TailEventSink};
