//! Error types for cw-model.

use thiserror::Error;

/// Result type alias for cw-model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur when talking to the embedding or rerank services.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A required configuration value is missing or invalid.
    #[error("Model config error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },

    /// The service returned a non-success HTTP status after all retries.
    #[error("{service} request failed with HTTP {status}: {message}")]
    Api {
        /// Which service failed ("embedding" or "rerank").
        service: String,
        /// HTTP status code returned by the service.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// The service kept returning 429 after all retries.
    #[error("{service} rate limited after {attempts} attempts")]
    RateLimited {
        /// Which service was rate limited.
        service: String,
        /// How many attempts were made.
        attempts: u32,
    },

    /// The embedding service returned a vector of the wrong dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The configured dimension.
        expected: usize,
        /// The dimension actually returned.
        actual: usize,
    },

    /// The service response body could not be parsed.
    #[error("{service} returned an unparseable response: {message}")]
    InvalidResponse {
        /// Which service returned the response.
        service: String,
        /// Description of the parse failure.
        message: String,
    },

    /// Transport-level HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ModelError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an API error.
    pub fn api(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    /// Create an invalid-response error.
    pub fn invalid_response(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service: service.into(),
            message: message.into(),
        }
    }
}
