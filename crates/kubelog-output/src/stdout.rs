use kubelog_core::{KubeLogError, StructuredLogEntry};
use tokio::io::{AsyncWriteExt, Stdout};
use tracing::debug;

/// Output format for stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed, human-readable format
    #[default]
    Pretty,
    /// Envelope JSON (one line per entry)
    Json,
    /// Message text only
    Raw,
}

impl OutputFormat {
    /// Parse a format name, falling back to `Pretty`
    pub fn parse(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "json" => Self::Json,
            "raw" => Self::Raw,
            _ => Self::Pretty,
        }
    }
}

/// Writes structured log entries to stdout
pub struct StdoutWriter {
    format: OutputFormat,
    stdout: Stdout,
}

impl StdoutWriter {
    /// Create a new stdout writer with default format
    pub fn new() -> Self {
        Self::with_format(OutputFormat::default())
    }

    /// Create a new stdout writer with a specific format
    pub fn with_format(format: OutputFormat) -> Self {
        Self {
            format,
            stdout: tokio::io::stdout(),
        }
    }

    /// Write all entries and flush once
    pub async fn write_all(&mut self, entries: &[StructuredLogEntry]) -> Result<(), KubeLogError> {
        let mut output = String::new();
        for entry in entries {
            output.push_str(&self.format_entry(entry)?);
            output.push('\n');
        }

        self.stdout.write_all(output.as_bytes()).await?;
        self.stdout.flush().await?;

        debug!(format = ?self.format, count = entries.len(), "Wrote entries to stdout");
        Ok(())
    }

    /// Format an entry according to the output format
    fn format_entry(&self, entry: &StructuredLogEntry) -> Result<String, KubeLogError> {
        match self.format {
            OutputFormat::Pretty => Ok(self.format_pretty(entry)),
            OutputFormat::Json => entry
                .to_json()
                .map_err(|e| KubeLogError::Pipeline(format!("Failed to serialize entry: {}", e))),
            OutputFormat::Raw => Ok(entry.message.clone()),
        }
    }

    /// Format an entry in a human-readable way
    fn format_pretty(&self, entry: &StructuredLogEntry) -> String {
        let mut parts = Vec::new();

        parts.push(format!("[{}]", entry.time.format("%Y-%m-%d %H:%M:%S%.3f")));
        parts.push(format!("[{}]", entry.container));

        if !entry.stream.is_empty() {
            parts.push(format!("[{}]", entry.stream));
        }

        parts.push(entry.message.clone());
        parts.join(" ")
    }
}

impl Default for StdoutWriter {
    fn default() -> Self {
        Self::new()
    }
}
