use kubelog_core::{CacheError, LogCache, RawLogEntry, StructuredLogEntry, TimeRange};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::RwLock;
use tracing::debug;

/// Default number of entries kept in memory
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Bounded in-memory log store
///
/// Entries are kept in ingestion order; once `max_entries` is reached the
/// oldest entry is evicted for every new one.
pub struct MemoryLogCache {
    max_entries: usize,
    entries: RwLock<VecDeque<StructuredLogEntry>>,
}

impl MemoryLogCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Turn one raw line into a structured entry
    ///
    /// Lines that are not envelopes are kept verbatim as the message, stamped
    /// with the time the batch was read.
    fn to_structured(raw: &RawLogEntry, container: &str, line: &str) -> StructuredLogEntry {
        match StructuredLogEntry::try_parse(line) {
            Some(mut entry) if !entry.is_default() => {
                if entry.container.is_empty() {
                    entry.container = container.to_string();
                }
                entry
            }
            _ => StructuredLogEntry {
                container: container.to_string(),
                message: line.to_string(),
                stream: String::new(),
                time: raw.received_at,
            },
        }
    }
}

impl Default for MemoryLogCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl LogCache for MemoryLogCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn add_entry(&self, entry: RawLogEntry) -> Result<(), CacheError> {
        let container = container_name(&entry.source);
        let parsed: Vec<StructuredLogEntry> = entry
            .split_lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Self::to_structured(&entry, &container, line))
            .collect();

        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        for structured in parsed {
            if entries.len() == self.max_entries {
                entries.pop_front();
            }
            entries.push_back(structured);
        }

        debug!(source = %entry.source, total = entries.len(), "Added entries to cache");
        Ok(())
    }

    fn query(&self, filter: &str, max_results: usize, range: TimeRange) -> Vec<StructuredLogEntry> {
        let Ok(entries) = self.entries.read() else {
            return Vec::new();
        };

        let needle = filter.to_lowercase();
        let mut results: Vec<StructuredLogEntry> = entries
            .iter()
            .rev()
            .filter(|entry| range.contains(&entry.time) && matches_filter(entry, &needle))
            .take(max_results)
            .cloned()
            .collect();
        results.reverse();
        results
    }
}

/// Case-insensitive substring match over message, container and stream
fn matches_filter(entry: &StructuredLogEntry, needle: &str) -> bool {
    needle.is_empty()
        || entry.message.to_lowercase().contains(needle)
        || entry.container.to_lowercase().contains(needle)
        || entry.stream.to_lowercase().contains(needle)
}

/// Container name derived from a log file name (`web-1.log` -> `web-1`)
fn container_name(source: &str) -> String {
    Path::new(source)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string())
}
