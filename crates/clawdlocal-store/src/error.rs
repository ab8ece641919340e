//! Error types for the clawdlocal-store crate.
//!
//! All fallible storage operations return [`StoreError`] via [`StoreResult`].
//! A missing key is never an error: lookups return `Option`.

use std::path::PathBuf;

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the memory store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the long-term memory file failed.  The in-memory
    /// state may already reflect the attempted change.
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking file write could not be joined.
    #[error("task join error: {0}")]
    TaskJoin(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
