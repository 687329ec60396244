use crate::error::CacheError;
use crate::log_entry::{RawLogEntry, StructuredLogEntry, TimeRange};
use std::sync::Arc;

/// Queryable store that receives ingested log batches
///
/// `add_entry` is only called from the ingestion pipeline's drain task, one
/// entry at a time. It should return quickly: a slow cache throttles ingestion.
pub trait LogCache: Send + Sync {
    /// Returns the name of the cache (for logging/debugging)
    fn name(&self) -> &'static str;

    /// Store a raw batch of lines
    fn add_entry(&self, entry: RawLogEntry) -> Result<(), CacheError>;

    /// Return at most `max_results` entries matching `filter` inside `range`
    fn query(&self, filter: &str, max_results: usize, range: TimeRange) -> Vec<StructuredLogEntry>;
}

/// Events emitted by the file-set manager while processing notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    /// A read burst for the named file is about to start
    ScanStarted { file: String },

    /// New complete lines were read
    Lines(RawLogEntry),

    /// The read burst for the named file finished
    ScanCompleted { file: String },
}

/// Receiver of [`TailEvent`]s
///
/// Implementations must not block: they are called from the notification
/// processing path.
pub trait TailEventSink: Send + Sync {
    fn post(&self, event: TailEvent);
}

impl<T: TailEventSink + ?Sized> TailEventSink for Arc<T> {
    fn post(&self, event: TailEvent) {
        (**self).post(event)
    }
}

/// A sink that drops every event
///
/// Useful as a placeholder or for testing
pub struct NullSink;

impl TailEventSink for NullSink {
    fn post(&self, _event: TailEvent) {}
}
