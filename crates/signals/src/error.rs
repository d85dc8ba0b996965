//! Catalog and Persistence Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or querying the signal catalog
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Key is not in the catalog
    #[error("Unknown signal: {0}")]
    UnknownSignal(String),

    /// Same key registered twice
    #[error("Duplicate signal key: {0}")]
    DuplicateKey(String),

    /// Key cannot be used as an HTML id / form field name
    #[error("Signal key {0:?} must match [A-Za-z][A-Za-z0-9_-]*")]
    InvalidKey(String),
}

/// Errors reading or writing the persisted selection file
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content is not a JSON object of strings
    #[error("Malformed selection file: {0}")]
    Format(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}
