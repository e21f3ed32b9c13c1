//! Error types for umls-sync-rrf.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RrfError>;

#[derive(Error, Debug)]
pub enum RrfError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("required release file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("{count} malformed rows in {path} exceeds the configured threshold of {threshold}")]
    MalformedRows {
        path: PathBuf,
        count: u64,
        threshold: u64,
    },

    #[error("failed to build parser worker pool: {0}")]
    WorkerPool(String),
}

impl RrfError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RrfError::Io {
            path: path.into(),
            source,
        }
    }
}
