//! # cw-model
//!
//! ML service boundary for ContextWeaver - embeddings and reranking.
//!
//! Both capabilities are remote HTTP services; this crate owns the request
//! shapes, retry policy, and dimension checking, and exposes them behind
//! traits so the engine (and its tests) never see HTTP:
//!
//! - [`EmbeddingModel`]: batch text -> dense vectors of a fixed dimension
//! - [`RerankerModel`]: (query, documents) -> relevance-scored indices
//!
//! ## Design Principles
//!
//! 1. **Production-only**: no mock implementations here. Test doubles live
//!    in consuming crates.
//! 2. **Provider-agnostic**: traits don't leak `reqwest` internals.
//! 3. **Environment-configured**: base URL, key, model id, and dimension
//!    come from `CONTEXTWEAVER_*` variables (see [`config`]).
//!
//! ## Usage
//!
//! ```ignore
//! use cw_model::{create_embedding_model, EmbeddingConfig, EmbeddingModel};
//!
//! let config = EmbeddingConfig::from_env()?;
//! let model = create_embedding_model(config);
//! let vectors = model.embed(&["fn main() {}".to_string()])?;
//! assert_eq!(vectors[0].len(), model.dimension());
//! ```

pub mod config;
pub mod error;

mod embedding;
mod http;
mod reranker;

pub use config::{
    EmbeddingConfig, RerankerConfig, DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_RERANK_TOP_N,
};
pub use embedding::RemoteEmbeddingModel;
pub use error::{ModelError, ModelResult};
pub use reranker::RemoteRerankerModel;

// ============================================================================
// Embedding Model Trait
// ============================================================================

/// Trait for embedding backends.
///
/// Generates dense vector embeddings from text inputs for semantic search.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow use across threads.
pub trait EmbeddingModel: Send + Sync + std::fmt::Debug {
    /// Generate embeddings for a batch of texts.
    ///
    /// Returns one vector per input text, each of length [`dimension`].
    /// Inputs larger than the service batch size are split transparently.
    ///
    /// [`dimension`]: EmbeddingModel::dimension
    fn embed(&self, texts: &[String]) -> ModelResult<Vec<Vec<f32>>>;

    /// Embed a single query string.
    fn embed_query(&self, text: &str) -> ModelResult<Vec<f32>> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string()))?;
        vectors.pop().ok_or_else(|| {
            ModelError::invalid_response("embedding", "empty response for query")
        })
    }

    /// The fixed embedding dimension.
    fn dimension(&self) -> usize;

    /// The model identifier.
    fn model_id(&self) -> &str;
}

// ============================================================================
// Reranker Model Trait
// ============================================================================

/// One scored entry from a rerank call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankResult {
    /// Index into the submitted document list.
    pub index: usize,
    /// Relevance score; higher is more relevant.
    pub relevance_score: f32,
}

/// Trait for rerank backends.
///
/// Scores query-document pairs; higher scores indicate more relevant
/// documents. Results are returned for at most `top_n` documents, sorted by
/// the service.
pub trait RerankerModel: Send + Sync + std::fmt::Debug {
    /// Score `documents` against `query`.
    ///
    /// Returned indices refer to positions in `documents`. An index out of
    /// range is a service bug; such entries are dropped.
    fn rerank(&self, query: &str, documents: &[String]) -> ModelResult<Vec<RerankResult>>;

    /// The configured result cut (`top_n`).
    fn top_n(&self) -> usize;

    /// The model identifier.
    fn model_id(&self) -> &str;
}

// ============================================================================
// Factory Functions
// ============================================================================

/// Create the embedding client for a configuration.
pub fn create_embedding_model(config: EmbeddingConfig) -> Box<dyn EmbeddingModel> {
    Box::new(RemoteEmbeddingModel::new(config))
}

/// Create the rerank client for a configuration.
pub fn create_reranker_model(config: RerankerConfig) -> Box<dyn RerankerModel> {
    Box::new(RemoteRerankerModel::new(config))
}
