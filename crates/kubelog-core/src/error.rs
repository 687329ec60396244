use std::path::PathBuf;
use thiserror::Error;

/// Core error types for kubelog
#[derive(Debug, Error)]
pub enum KubeLogError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while watching or tailing log files
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("File watch error: {0}")]
    FileWatch(String),

    #[error("Failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a log cache when accepting an entry
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Entry rejected: {0}")]
    Rejected(String),

    #[error("Cache lock poisoned")]
    Poisoned,
}

/// Result type alias for kubelog operations
pub type Result<T> = std::result::Result<T, KubeLogError>;
