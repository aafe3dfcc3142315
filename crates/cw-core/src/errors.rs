//! Error types for cw-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for cw-core operations.
pub type CwResult<T> = Result<T, CwError>;

/// Domain-specific errors for ContextWeaver operations.
#[derive(Error, Debug)]
pub enum CwError {
    /// The project root does not exist or is not a directory.
    #[error("Project root not found: {0}")]
    ProjectRootNotFound(PathBuf),

    /// The user home directory could not be determined.
    #[error("Could not determine the home directory")]
    NoHomeDirectory,

    /// A configuration value is invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// The embedding or rerank client is required but not configured.
    #[error("{operation} requires the {service} service. Set the CONTEXTWEAVER_* variables.")]
    ServiceNotConfigured {
        /// The operation that needed the service.
        operation: String,
        /// Which service is missing ("embedding" or "rerank").
        service: String,
    },

    /// The project lock could not be acquired within the wait window.
    #[error("Another ContextWeaver process holds the lock at {path} (waited {waited_ms}ms)")]
    LockTimeout {
        /// Path of the lock file.
        path: PathBuf,
        /// How long acquisition was attempted.
        waited_ms: u64,
    },

    /// Lock file I/O failed.
    #[error("Lock I/O error at {path}: {message}")]
    LockIo {
        /// Path of the lock file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Storage-layer error.
    #[error(transparent)]
    Db(#[from] cw_db::DbError),

    /// Embedding or rerank service error.
    #[error(transparent)]
    Model(#[from] cw_model::ModelError),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CwError {
    /// Create a lock I/O error.
    pub fn lock_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::LockIo {
            path: path.into(),
            message: message.into(),
        }
    }
}
