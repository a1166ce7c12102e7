use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to fetch {source_id}: {reason}")]
    Fetch { source_id: String, reason: String },

    #[error("Embedding service error{}: {message}", format_status(*.status))]
    EmbeddingService { status: Option<u16>, message: String },

    #[error("Dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Metric mismatch: index was built for {index}, requested {requested}")]
    MetricMismatch {
        index: index::Metric,
        requested: index::Metric,
    },

    #[error("Storage error at {}: {message}", .path.display())]
    Storage { path: PathBuf, message: String },

    #[error("No index found at {}", .path.display())]
    IndexNotFound { path: PathBuf },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl IndexError {
    pub(crate) fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn embedding(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::EmbeddingService {
            status,
            message: message.into(),
        }
    }
}

fn format_status(status: Option<u16>) -> String {
    status.map_or_else(String::new, |code| format!(" (HTTP {})", code))
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod indexer;
pub mod sources;
