//! SQLite schema for the per-project row store.
//!
//! The row store holds file metadata and content plus the metadata KV.
//! The two FTS5 tables are created separately because their tokenizer is
//! probed at connection time (trigram when supported, unicode61 otherwise).

/// Static schema: `files` and `metadata`.
pub const SCHEMA: &str = r#"
-- ============================================
-- FILES
-- ============================================

-- One row per indexed file, keyed by project-relative POSIX path.
-- vector_index_hash records the content hash whose vectors are known
-- durably written; NULL or a different value means (re)index is needed.
CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    hash TEXT NOT NULL,
    mtime INTEGER NOT NULL,
    size INTEGER NOT NULL,
    content TEXT,
    language TEXT NOT NULL,
    vector_index_hash TEXT
);

CREATE INDEX IF NOT EXISTS idx_files_hash ON files(hash);
CREATE INDEX IF NOT EXISTS idx_files_mtime ON files(mtime);

-- ============================================
-- METADATA
-- ============================================

-- Small KV for index-level settings (embedding_dimensions, ...).
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// FTS5 DDL, parameterized by the probed tokenizer.
pub fn fts_schema(tokenizer: &str) -> String {
    format!(
        r#"
CREATE VIRTUAL TABLE IF NOT EXISTS files_fts USING fts5(
    path,
    content,
    tokenize='{tokenizer}'
);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    chunk_id UNINDEXED,
    file_path UNINDEXED,
    chunk_index UNINDEXED,
    breadcrumb,
    content,
    tokenize='{tokenizer}'
);
"#
    )
}
