//! Configuration for the remote embedding and rerank services.
//!
//! Both services are configured entirely from the environment. The variables
//! mirror the service boundary: base URL, API key, model id, plus the
//! embedding dimension and the rerank cut.

use std::env;

use crate::error::{ModelError, ModelResult};

/// Default embedding batch size sent per HTTP request.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;

/// Default number of results requested from the reranker.
pub const DEFAULT_RERANK_TOP_N: usize = 10;

/// Environment variable names consumed by [`EmbeddingConfig::from_env`].
pub const EMBEDDING_BASE_URL_ENV: &str = "CONTEXTWEAVER_EMBEDDING_BASE_URL";
pub const EMBEDDING_API_KEY_ENV: &str = "CONTEXTWEAVER_EMBEDDING_API_KEY";
pub const EMBEDDING_MODEL_ENV: &str = "CONTEXTWEAVER_EMBEDDING_MODEL";
pub const EMBEDDING_DIMENSIONS_ENV: &str = "CONTEXTWEAVER_EMBEDDING_DIMENSIONS";

/// Environment variable names consumed by [`RerankerConfig::from_env`].
pub const RERANK_BASE_URL_ENV: &str = "CONTEXTWEAVER_RERANK_BASE_URL";
pub const RERANK_API_KEY_ENV: &str = "CONTEXTWEAVER_RERANK_API_KEY";
pub const RERANK_MODEL_ENV: &str = "CONTEXTWEAVER_RERANK_MODEL";
pub const RERANK_TOP_N_ENV: &str = "CONTEXTWEAVER_RERANK_TOP_N";

/// Configuration for the remote embedding service.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding API (e.g. `https://api.example.com/v1`).
    pub base_url: String,
    /// Bearer token, if the service requires one.
    pub api_key: Option<String>,
    /// Model identifier sent with every request.
    pub model_id: String,
    /// Expected embedding dimension. Every returned vector is checked
    /// against this value.
    pub dimensions: usize,
    /// How many texts to embed per HTTP request.
    pub batch_size: usize,
}

impl EmbeddingConfig {
    /// Load the embedding configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] if a required variable is missing or
    /// the dimension is not a positive integer.
    pub fn from_env() -> ModelResult<Self> {
        let base_url = require_env(EMBEDDING_BASE_URL_ENV)?;
        let model_id = require_env(EMBEDDING_MODEL_ENV)?;
        let dimensions = require_env(EMBEDDING_DIMENSIONS_ENV)?
            .parse::<usize>()
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                ModelError::config(format!(
                    "{EMBEDDING_DIMENSIONS_ENV} must be a positive integer"
                ))
            })?;

        Ok(Self {
            base_url: trim_trailing_slash(base_url),
            api_key: env::var(EMBEDDING_API_KEY_ENV).ok().filter(|k| !k.is_empty()),
            model_id,
            dimensions,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        })
    }
}

/// Configuration for the remote rerank service.
#[derive(Debug, Clone)]
pub struct RerankerConfig {
    /// Base URL of the rerank API.
    pub base_url: String,
    /// Bearer token, if the service requires one.
    pub api_key: Option<String>,
    /// Model identifier sent with every request.
    pub model_id: String,
    /// Number of top results requested (`top_n` in the request body).
    pub top_n: usize,
}

impl RerankerConfig {
    /// Load the reranker configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] if a required variable is missing.
    pub fn from_env() -> ModelResult<Self> {
        let base_url = require_env(RERANK_BASE_URL_ENV)?;
        let model_id = require_env(RERANK_MODEL_ENV)?;
        let top_n = match env::var(RERANK_TOP_N_ENV) {
            Ok(raw) => raw.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                ModelError::config(format!("{RERANK_TOP_N_ENV} must be a positive integer"))
            })?,
            Err(_) => DEFAULT_RERANK_TOP_N,
        };

        Ok(Self {
            base_url: trim_trailing_slash(base_url),
            api_key: env::var(RERANK_API_KEY_ENV).ok().filter(|k| !k.is_empty()),
            model_id,
            top_n,
        })
    }
}

fn require_env(name: &str) -> ModelResult<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ModelError::config(format!("{name} is not set")))
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
