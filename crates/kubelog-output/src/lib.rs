//! kubelog Output
//!
//! Downstream collaborators of the ingestion pipeline: the in-memory log
//! cache and the stdout writer used to print query results.

pub mod cache;
pub mod stdout;

pub use cache::{MemoryLogCache, DEFAULT_MAX_ENTRIES};
pub use stdout::{OutputFormat, StdoutWriter};
