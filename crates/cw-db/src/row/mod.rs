//! Per-project SQLite row store.
//!
//! Holds the `files` table (metadata + normalized UTF-8 content), the
//! `metadata` KV, and the two FTS5 mirrors (`files_fts`, `chunks_fts`).
//! All batch mutations run inside a single transaction so the FTS mirrors
//! stay consistent with the row they mirror.

mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{DbError, DbResult};

pub use schema::{fts_schema, SCHEMA};

/// Metadata key recording the embedding dimension the index was built with.
pub const META_EMBEDDING_DIMENSIONS: &str = "embedding_dimensions";

/// Extra results requested in the relaxed FTS pass beyond the remaining gap.
const RELAXED_PASS_BUFFER: usize = 10;

// ============================================================================
// Row types
// ============================================================================

/// File metadata loaded at scan start (content omitted).
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub path: String,
    pub hash: String,
    pub mtime: i64,
    pub size: i64,
    pub vector_index_hash: Option<String>,
}

/// A file row to insert or replace.
#[derive(Debug, Clone)]
pub struct FileUpsert {
    pub path: String,
    pub hash: String,
    pub mtime: i64,
    pub size: i64,
    /// Normalized UTF-8 content; `None` for skipped/binary files.
    pub content: Option<String>,
    pub language: String,
}

/// One chunk row mirrored into `chunks_fts`.
#[derive(Debug, Clone)]
pub struct ChunkFtsRow {
    pub chunk_id: String,
    pub chunk_index: u32,
    pub breadcrumb: String,
    pub content: String,
}

/// A lexical hit from `chunks_fts`.
#[derive(Debug, Clone)]
pub struct ChunkFtsHit {
    pub chunk_id: String,
    pub file_path: String,
    pub chunk_index: u32,
    pub breadcrumb: String,
    pub content: String,
    /// Negated `bm25()`, so higher is better.
    pub score: f64,
}

/// A lexical hit from `files_fts`.
#[derive(Debug, Clone)]
pub struct FileFtsHit {
    pub path: String,
    /// Negated `bm25()`, so higher is better.
    pub score: f64,
}

// ============================================================================
// RowStore
// ============================================================================

/// Handle to the per-project `index.db`.
pub struct RowStore {
    conn: Connection,
    path: PathBuf,
    trigram: bool,
}

impl RowStore {
    /// Open (or create) the row store at `path`.
    ///
    /// Sets WAL journaling, applies the schema, probes the connection for
    /// trigram tokenizer support, and creates the FTS tables accordingly.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DbError::row_io(parent, e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;

        let trigram = probe_trigram(&conn);
        let tokenizer = if trigram { "trigram" } else { "unicode61" };
        debug!("FTS tokenizer for {:?}: {tokenizer}", path);
        conn.execute_batch(&fts_schema(tokenizer))?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            trigram,
        })
    }

    /// Whether this connection's FTS tables use the trigram tokenizer.
    pub fn trigram_enabled(&self) -> bool {
        self.trigram
    }

    /// Filesystem path of the database.
    pub fn db_path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Metadata KV
    // ========================================================================

    /// Read a metadata value.
    pub fn get_metadata(&self, key: &str) -> DbResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a metadata value.
    pub fn set_metadata(&self, key: &str, value: &str) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Load metadata for every known file (content omitted).
    pub fn load_all_files(&self) -> DbResult<Vec<FileMeta>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, hash, mtime, size, vector_index_hash FROM files")?;
        let rows = stmt.query_map([], |row| {
            Ok(FileMeta {
                path: row.get(0)?,
                hash: row.get(1)?,
                mtime: row.get(2)?,
                size: row.get(3)?,
                vector_index_hash: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Insert or replace file rows, resetting `vector_index_hash` and
    /// updating `files_fts` in the same transaction.
    pub fn upsert_files(&mut self, files: &[FileUpsert]) -> DbResult<()> {
        if files.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        for file in files {
            tx.execute(
                "INSERT INTO files (path, hash, mtime, size, content, language, vector_index_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)
                 ON CONFLICT(path) DO UPDATE SET
                    hash = excluded.hash,
                    mtime = excluded.mtime,
                    size = excluded.size,
                    content = excluded.content,
                    language = excluded.language,
                    vector_index_hash = NULL",
                params![
                    file.path,
                    file.hash,
                    file.mtime,
                    file.size,
                    file.content,
                    file.language
                ],
            )?;
            tx.execute("DELETE FROM files_fts WHERE path = ?1", params![file.path])?;
            if let Some(content) = &file.content {
                tx.execute(
                    "INSERT INTO files_fts (path, content) VALUES (?1, ?2)",
                    params![file.path, content],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Refresh `mtime` for unchanged files.
    pub fn update_mtimes(&mut self, entries: &[(String, i64)]) -> DbResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        for (path, mtime) in entries {
            tx.execute(
                "UPDATE files SET mtime = ?2 WHERE path = ?1",
                params![path, mtime],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete file rows and their `files_fts` mirrors.
    pub fn delete_files(&mut self, paths: &[String]) -> DbResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        for path in paths {
            tx.execute("DELETE FROM files WHERE path = ?1", params![path])?;
            tx.execute("DELETE FROM files_fts WHERE path = ?1", params![path])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Record that vectors for `path` at `hash` are durably written.
    pub fn set_vector_index_hash(&self, path: &str, hash: &str) -> DbResult<()> {
        self.conn.execute(
            "UPDATE files SET vector_index_hash = ?2 WHERE path = ?1",
            params![path, hash],
        )?;
        Ok(())
    }

    /// Drop every row and FTS mirror (full reindex).
    pub fn truncate(&mut self) -> DbResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM files", [])?;
        tx.execute("DELETE FROM files_fts", [])?;
        tx.execute("DELETE FROM chunks_fts", [])?;
        tx.commit()?;
        Ok(())
    }

    /// All known file paths.
    pub fn all_paths(&self) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT path FROM files")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Content of a single file, if stored.
    pub fn get_content(&self, path: &str) -> DbResult<Option<String>> {
        let content = self
            .conn
            .query_row(
                "SELECT content FROM files WHERE path = ?1",
                params![path],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(content.flatten())
    }

    /// Batch-load contents for `paths` in one query per 200 paths.
    pub fn get_contents(&self, paths: &[String]) -> DbResult<HashMap<String, String>> {
        let mut out = HashMap::new();
        for batch in paths.chunks(200) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT path, content FROM files WHERE path IN ({placeholders}) AND content IS NOT NULL"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(batch.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (path, content) = row?;
                out.insert(path, content);
            }
        }
        Ok(out)
    }

    /// Number of file rows.
    pub fn file_count(&self) -> DbResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Rows with content whose vectors are missing or stale.
    pub fn pending_vector_count(&self) -> DbResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM files
             WHERE content IS NOT NULL
               AND (vector_index_hash IS NULL OR vector_index_hash != hash)",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ========================================================================
    // Chunk FTS
    // ========================================================================

    /// Replace the `chunks_fts` rows for one file.
    pub fn replace_chunk_fts(&mut self, path: &str, rows: &[ChunkFtsRow]) -> DbResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM chunks_fts WHERE file_path = ?1", params![path])?;
        for row in rows {
            tx.execute(
                "INSERT INTO chunks_fts (chunk_id, file_path, chunk_index, breadcrumb, content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![row.chunk_id, path, row.chunk_index, row.breadcrumb, row.content],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Purge `chunks_fts` rows for deleted files.
    pub fn delete_chunk_fts(&mut self, paths: &[String]) -> DbResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        for path in paths {
            tx.execute("DELETE FROM chunks_fts WHERE file_path = ?1", params![path])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Number of `chunks_fts` rows (for status reporting).
    pub fn chunk_fts_count(&self) -> DbResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks_fts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========================================================================
    // BM25 search (two-pass)
    // ========================================================================

    /// Search `chunks_fts`: strict AND pass, then a relaxed OR pass if the
    /// strict pass came up short and the query has more than one token.
    pub fn search_chunks_fts(&self, tokens: &[String], k: usize) -> DbResult<Vec<ChunkFtsHit>> {
        if tokens.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = self.query_chunks_fts(&match_expr(tokens, "AND"), k)?;
        if hits.len() < k && tokens.len() > 1 {
            let relaxed_limit = k - hits.len() + RELAXED_PASS_BUFFER;
            let relaxed = self.query_chunks_fts(&match_expr(tokens, "OR"), relaxed_limit)?;
            merge_chunk_hits(&mut hits, relaxed, k);
        }
        Ok(hits)
    }

    /// Search `files_fts` with the same two-pass strategy.
    pub fn search_files_fts(&self, tokens: &[String], k: usize) -> DbResult<Vec<FileFtsHit>> {
        if tokens.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = self.query_files_fts(&match_expr(tokens, "AND"), k)?;
        if hits.len() < k && tokens.len() > 1 {
            let relaxed_limit = k - hits.len() + RELAXED_PASS_BUFFER;
            let relaxed = self.query_files_fts(&match_expr(tokens, "OR"), relaxed_limit)?;
            for hit in relaxed {
                if hits.len() >= k {
                    break;
                }
                if !hits.iter().any(|h| h.path == hit.path) {
                    hits.push(hit);
                }
            }
        }
        Ok(hits)
    }

    fn query_chunks_fts(&self, match_query: &str, limit: usize) -> DbResult<Vec<ChunkFtsHit>> {
        let mut stmt = self.conn.prepare(
            "SELECT chunk_id, file_path, chunk_index, breadcrumb, content, -bm25(chunks_fts)
             FROM chunks_fts WHERE chunks_fts MATCH ?1
             ORDER BY bm25(chunks_fts) LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![match_query, limit as i64], |row| {
            Ok(ChunkFtsHit {
                chunk_id: row.get(0)?,
                file_path: row.get(1)?,
                chunk_index: row.get::<_, i64>(2)? as u32,
                breadcrumb: row.get(3)?,
                content: row.get(4)?,
                score: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_files_fts(&self, match_query: &str, limit: usize) -> DbResult<Vec<FileFtsHit>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, -bm25(files_fts)
             FROM files_fts WHERE files_fts MATCH ?1
             ORDER BY bm25(files_fts) LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![match_query, limit as i64], |row| {
            Ok(FileFtsHit {
                path: row.get(0)?,
                score: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Probe the connection for trigram tokenizer support.
///
/// Creates and drops a throw-away virtual table; older SQLite builds fail
/// the creation, in which case callers fall back to unicode61.
fn probe_trigram(conn: &Connection) -> bool {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE temp.cw_trigram_probe USING fts5(x, tokenize='trigram');
         DROP TABLE temp.cw_trigram_probe;",
    )
    .is_ok()
}

/// Build an FTS5 MATCH expression with every token double-quoted.
fn match_expr(tokens: &[String], op: &str) -> String {
    tokens
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(&format!(" {op} "))
}

fn merge_chunk_hits(hits: &mut Vec<ChunkFtsHit>, relaxed: Vec<ChunkFtsHit>, k: usize) {
    for hit in relaxed {
        if hits.len() >= k {
            break;
        }
        if !hits.iter().any(|h| h.chunk_id == hit.chunk_id) {
            hits.push(hit);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, RowStore) {
        let dir = TempDir::new().unwrap();
        let store = RowStore::open(&dir.path().join("index.db")).unwrap();
        (dir, store)
    }

    fn file(path: &str, hash: &str, content: &str) -> FileUpsert {
        FileUpsert {
            path: path.to_string(),
            hash: hash.to_string(),
            mtime: 1,
            size: content.len() as i64,
            content: Some(content.to_string()),
            language: "rust".to_string(),
        }
    }

    #[test]
    fn metadata_roundtrip() {
        let (_dir, store) = open_store();
        assert_eq!(store.get_metadata(META_EMBEDDING_DIMENSIONS).unwrap(), None);
        store.set_metadata(META_EMBEDDING_DIMENSIONS, "768").unwrap();
        assert_eq!(
            store.get_metadata(META_EMBEDDING_DIMENSIONS).unwrap(),
            Some("768".to_string())
        );
        store.set_metadata(META_EMBEDDING_DIMENSIONS, "1024").unwrap();
        assert_eq!(
            store.get_metadata(META_EMBEDDING_DIMENSIONS).unwrap(),
            Some("1024".to_string())
        );
    }

    #[test]
    fn upsert_resets_vector_index_hash() {
        let (_dir, mut store) = open_store();
        store.upsert_files(&[file("a.rs", "h1", "fn a() {}")]).unwrap();
        store.set_vector_index_hash("a.rs", "h1").unwrap();

        let metas = store.load_all_files().unwrap();
        assert_eq!(metas[0].vector_index_hash.as_deref(), Some("h1"));

        store.upsert_files(&[file("a.rs", "h2", "fn a2() {}")]).unwrap();
        let metas = store.load_all_files().unwrap();
        assert_eq!(metas[0].hash, "h2");
        assert_eq!(metas[0].vector_index_hash, None);
    }

    #[test]
    fn delete_removes_row_and_fts() {
        let (_dir, mut store) = open_store();
        store
            .upsert_files(&[file("a.rs", "h1", "alpha beta"), file("b.rs", "h2", "gamma")])
            .unwrap();
        store.delete_files(&["a.rs".to_string()]).unwrap();

        assert_eq!(store.file_count().unwrap(), 1);
        let hits = store
            .search_files_fts(&["alpha".to_string()], 10)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn pending_vector_count_tracks_stale_rows() {
        let (_dir, mut store) = open_store();
        store
            .upsert_files(&[file("a.rs", "h1", "x"), file("b.rs", "h2", "y")])
            .unwrap();
        assert_eq!(store.pending_vector_count().unwrap(), 2);
        store.set_vector_index_hash("a.rs", "h1").unwrap();
        assert_eq!(store.pending_vector_count().unwrap(), 1);
        // Stale (hash moved on) counts as pending again.
        store.set_vector_index_hash("b.rs", "old").unwrap();
        assert_eq!(store.pending_vector_count().unwrap(), 1);
    }

    #[test]
    fn chunks_fts_two_pass_search() {
        let (_dir, mut store) = open_store();
        store
            .replace_chunk_fts(
                "a.rs",
                &[
                    ChunkFtsRow {
                        chunk_id: "a.rs::h::0".to_string(),
                        chunk_index: 0,
                        breadcrumb: "a.rs > fn parse".to_string(),
                        content: "fn parse(input: &str) -> Token".to_string(),
                    },
                    ChunkFtsRow {
                        chunk_id: "a.rs::h::1".to_string(),
                        chunk_index: 1,
                        breadcrumb: "a.rs > fn render".to_string(),
                        content: "fn render(token: Token) -> String".to_string(),
                    },
                ],
            )
            .unwrap();

        // Strict pass: both tokens present only in chunk 0.
        let hits = store
            .search_chunks_fts(&["parse".to_string(), "input".to_string()], 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_index, 0);

        // Relaxed pass fills the gap when the strict pass comes up short.
        let hits = store
            .search_chunks_fts(&["token".to_string(), "missingword".to_string()], 10)
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn replace_chunk_fts_is_idempotent() {
        let (_dir, mut store) = open_store();
        let rows = vec![ChunkFtsRow {
            chunk_id: "a.rs::h::0".to_string(),
            chunk_index: 0,
            breadcrumb: "a.rs".to_string(),
            content: "hello world".to_string(),
        }];
        store.replace_chunk_fts("a.rs", &rows).unwrap();
        store.replace_chunk_fts("a.rs", &rows).unwrap();
        assert_eq!(store.chunk_fts_count().unwrap(), 1);
    }

    #[test]
    fn match_expr_quotes_tokens() {
        let expr = match_expr(&["api".to_string(), "key".to_string()], "AND");
        assert_eq!(expr, "\"api\" AND \"key\"");
    }

    #[test]
    fn get_contents_batches() {
        let (_dir, mut store) = open_store();
        let files: Vec<FileUpsert> = (0..250)
            .map(|i| file(&format!("f{i}.rs"), &format!("h{i}"), "content"))
            .collect();
        store.upsert_files(&files).unwrap();

        let paths: Vec<String> = (0..250).map(|i| format!("f{i}.rs")).collect();
        let contents = store.get_contents(&paths).unwrap();
        assert_eq!(contents.len(), 250);
    }
}
