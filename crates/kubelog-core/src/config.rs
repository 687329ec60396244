use crate::error::KubeLogError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for kubelog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Directory watching
    pub watch: WatchConfig,

    /// File tailing limits
    pub tail: TailConfig,

    /// Ingestion pipeline
    pub pipeline: PipelineConfig,

    /// In-memory log cache
    pub cache: CacheConfig,

    /// Query output
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, KubeLogError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KubeLogError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, KubeLogError> {
        toml::from_str(content)
            .map_err(|e| KubeLogError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, KubeLogError> {
        toml::to_string_pretty(self)
            .map_err(|e| KubeLogError::Config(format!("Failed to serialize config: {}", e)))
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Instance name for identification
    pub instance_name: String,

    /// Internal log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            instance_name: "kubelog".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Directory watching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory holding the log files
    pub directory: PathBuf,

    /// Glob pattern matched against file names inside `directory`
    pub pattern: String,

    /// Watch subdirectories as well
    pub recursive: bool,

    /// Start tracking files that already exist when the watcher starts
    pub scan_existing: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/var/log/containers"),
            pattern: "*.log".to_string(),
            recursive: false,
            scan_existing: true,
        }
    }
}

/// File tailing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Maximum bytes read from a file in one call
    pub read_cap_bytes: usize,

    /// Chunk size used when seeking backwards for a line boundary
    pub seek_chunk_size: usize,

    /// Maximum read calls per change notification
    pub max_reads_per_change: usize,

    /// Consecutive oversized reads before the scratch buffer is shrunk
    pub shrink_after_calls: u32,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            read_cap_bytes: 65_536,
            seek_chunk_size: 80,
            max_reads_per_change: 1000,
            shrink_after_calls: 20,
        }
    }
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of the bounded ingestion queue
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// In-memory cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries kept before the oldest are evicted
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
        }
    }
}

/// Query output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Format: pretty, json, raw
    pub format: String,

    /// Filter applied to the cache when printing results on shutdown
    pub query: Option<String>,

    /// Maximum entries printed
    pub max_results: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
            query: None,
            max_results: 100,
        }
    }
}
