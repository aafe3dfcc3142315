//! Error types for cw-db.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cw-db operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in cw-db operations.
#[derive(Debug, Error)]
pub enum DbError {
    // ========================================================================
    // Row store errors
    // ========================================================================
    /// Row store I/O error.
    #[error("Row store I/O error at {path}: {message}")]
    RowIo { path: PathBuf, message: String },

    /// SQLite error wrapper.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ========================================================================
    // Vector store errors
    // ========================================================================
    /// Vector dimension mismatch.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// LanceDB error.
    #[error("LanceDB error: {message}")]
    LanceDb { message: String },

    // ========================================================================
    // General errors
    // ========================================================================
    /// IO error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a row store I/O error.
    pub fn row_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::RowIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a LanceDB error.
    pub fn lance(message: impl Into<String>) -> Self {
        Self::LanceDb {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<lancedb::Error> for DbError {
    fn from(err: lancedb::Error) -> Self {
        Self::LanceDb {
            message: err.to_string(),
        }
    }
}
