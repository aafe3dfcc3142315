//! # cw-core
//!
//! **ContextWeaver** core engine: index a source repository incrementally
//! and serve code-aware context packs for downstream language models.
//!
//! ## Main Types
//!
//! - [`WeaverEngine`] - the entry point for scan, search, status, and clear
//! - [`ContextPack`] - the assembled answer context for one query
//! - [`CwError`] - domain-specific error type
//!
//! ## Pipeline
//!
//! ```text
//! scan:   crawl -> filter -> decode -> chunk (AST) -> persist rows/FTS
//!              -> embed -> vector upsert -> self-heal reconcile
//!
//! search: query
//!           |--> dense recall (vectors)
//!           |--> lexical recall (FTS5 BM25)
//!                     |
//!                RRF fusion -> rerank -> smart cutoff (seeds)
//!                     |
//!            graph expansion (neighbors / breadcrumbs / imports)
//!                     |
//!                context packing (merged segments, char budget)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use cw_core::{ScanOptions, WeaverConfig, WeaverEngine};
//! use std::path::Path;
//!
//! let engine = WeaverEngine::from_env(WeaverConfig::default())?;
//! let report = engine.scan(Path::new("."), &ScanOptions::default())?;
//! println!("indexed {} files", report.stats.added + report.stats.modified);
//!
//! let pack = engine.build_context_pack(Path::new("."), "where is auth handled?")?;
//! for file in &pack.files {
//!     println!("{} ({} segments)", file.file_path, file.segments.len());
//! }
//! ```

// Modules
pub mod chunk;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod expand;
pub mod index;
pub mod lock;
pub mod pack;
pub mod project;
pub mod scan;
pub mod search;

// Re-exports for convenience
pub use chunk::{
    chunk_source, IndexDomain, Language, ProcessedChunk, SemanticSplitter, SourceAdapter,
    SyntaxNode,
};
pub use config::{
    ExpandConfig, PackConfig, ScanOptions, SearchConfig, SplitterConfig, WeaverConfig,
};
pub use constants::{
    adaptive_concurrency, language_for_extension, language_for_path, CONTEXTWEAVER_HOME_DIR,
    IGNORE_FILENAME, IGNORE_PATTERNS_ENV, MAX_FILE_SIZE_BYTES,
};
pub use engine::{StatusReport, WeaverEngine};
pub use errors::{CwError, CwResult};
pub use expand::{is_barrel_file, ExpandOrigin, ExpandedChunk, GraphExpander};
pub use index::{IndexFile, Indexer};
pub use lock::ProcessLock;
pub use pack::{merge_intervals, ContextPacker, Interval, PackedFile, PackedSegment};
pub use project::ProjectId;
pub use scan::{
    FileError, FileStatus, ProcessedFile, ScanReport, ScanStats, Scanner, VectorIndexStats,
};
pub use search::{
    fusion::{rrf_fuse, smart_cutoff, ChunkKey, FusedCandidate, RecallSource},
    query::{segment_query, token_overlap_score},
    ContextPack, SearchDebug, SearchService, Seed,
};
