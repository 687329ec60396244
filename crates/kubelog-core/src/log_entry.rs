use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Unformatted batch of log lines as read from a tailed file
///
/// `lines` holds one or more complete lines, each terminated by `\n`
/// (optionally preceded by `\r`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogEntry {
    /// File or container name the lines were read from
    pub source: String,

    /// Raw text batch, always ending on a line boundary
    pub lines: String,

    /// Timestamp when the batch was read
    pub received_at: DateTime<Utc>,
}

impl RawLogEntry {
    /// Create a new raw entry stamped with the current time
    pub fn new(source: impl Into<String>, lines: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            lines: lines.into(),
            received_at: Utc::now(),
        }
    }

    /// Iterate over the individual lines of the batch without terminators
    pub fn split_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .split_terminator('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
    }
}

/// Log entry in the container runtime's JSON envelope format
///
/// Example line:
/// `{"cont":"web-1","log":"GET / 200","stream":"stdout","time":"2024-03-01T10:00:00Z"}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredLogEntry {
    /// Container name or id
    #[serde(rename = "cont")]
    pub container: String,

    /// Message text
    #[serde(rename = "log")]
    pub message: String,

    /// Stream designation (stdout, stderr)
    pub stream: String,

    /// Time the entry was written on the client side
    pub time: DateTime<Utc>,
}

impl StructuredLogEntry {
    /// Parse a single envelope line
    ///
    /// Empty or malformed input yields the default (empty) entry.
    pub fn parse(line: &str) -> Self {
        match serde_json::from_str::<Self>(line.trim()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Malformed log envelope, using empty entry");
                Self::default()
            }
        }
    }

    /// Parse a single envelope line, returning `None` when it is not a valid envelope
    ///
    /// Meant for probing lines that may be plain text, so failures only log at debug.
    pub fn try_parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        match serde_json::from_str::<Self>(trimmed) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Line is not a structured log envelope");
                None
            }
        }
    }

    /// Whether this is the empty value produced for unparseable input
    pub fn is_default(&self) -> bool {
        self.container.is_empty() && self.message.is_empty() && self.stream.is_empty()
    }

    /// Encode back into a single envelope line
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Inclusive time window used when querying the cache
///
/// An open bound (`None`) matches everything on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// A range without bounds
    pub fn all() -> Self {
        Self::default()
    }

    /// A closed range `[from, to]`
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| *time >= from) && self.to.map_or(true, |to| *time <= to)
    }
}
