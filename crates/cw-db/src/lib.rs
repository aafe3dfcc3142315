//! # cw-db
//!
//! Storage layer for ContextWeaver.
//!
//! Two stores per project, both living under `~/.contextweaver/<projectId>/`:
//!
//! - [`RowStore`] (`index.db`): SQLite with WAL journaling. Tables `files`
//!   (metadata + normalized content), `metadata` (KV), and the FTS5 mirrors
//!   `files_fts` / `chunks_fts` used for lexical BM25 recall.
//! - [`ChunkStore`] (`vectors.lance/`): LanceDB table of chunk records with
//!   embeddings, keyed by `(file_path, file_hash, chunk_index)`.
//!
//! The two converge through the scan/index cycle: `files.vector_index_hash`
//! marks which content hash has durably written vectors, and the chunk
//! store's monotonic upsert (insert new, then delete stale) guarantees a
//! file is never missing from the search index mid-update.

pub mod error;
pub mod row;
pub mod vector;

pub use error::{DbError, DbResult};
pub use row::{
    fts_schema, ChunkFtsHit, ChunkFtsRow, FileFtsHit, FileMeta, FileUpsert, RowStore,
    META_EMBEDDING_DIMENSIONS, SCHEMA,
};
pub use vector::{
    chunk_id, ChunkHit, ChunkRecord, ChunkStore, FileChunks, StoredChunk, CHUNKS_TABLE_NAME,
};
