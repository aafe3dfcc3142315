//! Per-project LanceDB chunk store.
//!
//! Stores one row per chunk, keyed by `(file_path, file_hash, chunk_index)`
//! with a derived `chunk_id` string. Updates are **monotonic**: new records
//! are inserted before stale ones are deleted, so a crash between the two
//! steps leaves old and new rows coexisting rather than a gap. Readers
//! dedup by `chunk_id` and `(file_path, chunk_index)`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::{
    connect,
    query::{ExecutableQuery, QueryBase},
    Connection, Table,
};
use tokio::runtime::Runtime;
use tracing::{debug, trace};

use crate::error::{DbError, DbResult};

/// Table name inside the `vectors.lance` directory.
pub const CHUNKS_TABLE_NAME: &str = "chunks";

/// Maximum files per upsert sub-batch.
const MAX_FILES_PER_BATCH: usize = 50;

/// Maximum records per upsert sub-batch.
const MAX_RECORDS_PER_BATCH: usize = 5000;

/// Row cap for non-vector scans (per-file chunk fetches).
const SCAN_LIMIT: usize = 100_000;

// ============================================================================
// Record types
// ============================================================================

/// Derive the chunk id for a `(path, hash, index)` triple.
pub fn chunk_id(file_path: &str, file_hash: &str, chunk_index: u32) -> String {
    format!("{file_path}::{file_hash}::{chunk_index}")
}

/// A chunk to write, vector included.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub file_path: String,
    pub file_hash: String,
    pub chunk_index: u32,
    pub vector: Vec<f32>,
    pub display_code: String,
    pub vector_text: String,
    pub breadcrumb: String,
    pub language: String,
    /// Semantic node span, UTF-16 code units.
    pub start_index: u32,
    pub end_index: u32,
    /// No-overlap coverage, byte offsets; rawSpans concatenate to the file.
    pub raw_start: u32,
    pub raw_end: u32,
    /// Possibly overlapping embedding window, byte offsets.
    pub vec_start: u32,
    pub vec_end: u32,
}

impl ChunkRecord {
    /// The derived chunk id.
    pub fn chunk_id(&self) -> String {
        chunk_id(&self.file_path, &self.file_hash, self.chunk_index)
    }
}

/// A chunk read back from the store (vector omitted).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredChunk {
    pub chunk_id: String,
    pub file_path: String,
    pub file_hash: String,
    pub chunk_index: u32,
    pub display_code: String,
    pub breadcrumb: String,
    pub language: String,
    pub start_index: u32,
    pub end_index: u32,
    pub raw_start: u32,
    pub raw_end: u32,
    pub vec_start: u32,
    pub vec_end: u32,
}

/// A vector-search hit.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub chunk: StoredChunk,
    /// Raw distance from the index (lower is closer).
    pub distance: f32,
}

/// One file's worth of records for a batch upsert.
#[derive(Debug, Clone)]
pub struct FileChunks {
    pub path: String,
    pub hash: String,
    pub records: Vec<ChunkRecord>,
}

// ============================================================================
// ChunkStore
// ============================================================================

/// LanceDB-backed chunk store.
pub struct ChunkStore {
    #[allow(dead_code)]
    path: PathBuf,
    dimension: usize,
    connection: Connection,
    table: RwLock<Option<Table>>,
    runtime: Runtime,
}

impl ChunkStore {
    /// Open or create the chunk store backing directory.
    pub fn open(path: &Path, dimension: usize) -> DbResult<Self> {
        debug!("Opening ChunkStore at {:?} (dim={dimension})", path);

        let runtime = Runtime::new()
            .map_err(|e| DbError::internal(format!("Failed to create runtime: {e}")))?;

        let connection = runtime
            .block_on(async { connect(path.to_string_lossy().as_ref()).execute().await })
            .map_err(|e| DbError::lance(format!("Failed to connect: {e}")))?;

        let store = Self {
            path: path.to_path_buf(),
            dimension,
            connection,
            table: RwLock::new(None),
            runtime,
        };

        store.ensure_table()?;
        Ok(store)
    }

    /// Drop and recreate the table empty (full reindex / dimension change).
    pub fn clear(&self) -> DbResult<()> {
        debug!("Clearing table '{CHUNKS_TABLE_NAME}'");
        let result = self
            .runtime
            .block_on(async { self.connection.drop_table(CHUNKS_TABLE_NAME).await });
        if let Err(e) = result {
            trace!("drop_table before recreate returned: {e}");
        }
        let mut guard = self
            .table
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire table lock: {e}")))?;
        *guard = None;
        drop(guard);
        self.ensure_table()
    }

    /// The configured vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn ensure_table(&self) -> DbResult<()> {
        let mut guard = self
            .table
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire table lock: {e}")))?;
        if guard.is_some() {
            return Ok(());
        }

        let names = self
            .runtime
            .block_on(async { self.connection.table_names().execute().await })
            .map_err(|e| DbError::lance(format!("Failed to list tables: {e}")))?;

        let table = if names.contains(&CHUNKS_TABLE_NAME.to_string()) {
            self.runtime
                .block_on(async {
                    self.connection.open_table(CHUNKS_TABLE_NAME).execute().await
                })
                .map_err(|e| DbError::lance(format!("Failed to open table: {e}")))?
        } else {
            let schema = self.schema();
            let batch = empty_batch(&schema, self.dimension)?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], Arc::new(schema));
            self.runtime
                .block_on(async {
                    self.connection
                        .create_table(CHUNKS_TABLE_NAME, Box::new(batches))
                        .execute()
                        .await
                })
                .map_err(|e| DbError::lance(format!("Failed to create table: {e}")))?
        };

        *guard = Some(table);
        Ok(())
    }

    fn get_table(&self) -> DbResult<Table> {
        self.ensure_table()?;
        let guard = self
            .table
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire table lock: {e}")))?;
        guard
            .clone()
            .ok_or_else(|| DbError::internal("Table not initialized"))
    }

    fn schema(&self) -> Schema {
        chunk_schema(self.dimension)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Monotonic upsert for one file: insert the new records, then delete
    /// rows where `file_path` matches and `file_hash` differs.
    pub fn upsert_file(
        &self,
        path: &str,
        new_hash: &str,
        records: &[ChunkRecord],
    ) -> DbResult<()> {
        self.batch_upsert_files(&[FileChunks {
            path: path.to_string(),
            hash: new_hash.to_string(),
            records: records.to_vec(),
        }])
    }

    /// Monotonic upsert for many files, grouped into sub-batches of at most
    /// [`MAX_FILES_PER_BATCH`] files and [`MAX_RECORDS_PER_BATCH`] records
    /// to bound native memory. One insert and one OR-joined delete per
    /// sub-batch; inserts always precede their deletes.
    pub fn batch_upsert_files(&self, files: &[FileChunks]) -> DbResult<()> {
        if files.is_empty() {
            return Ok(());
        }

        for file in files {
            for record in &file.records {
                if record.vector.len() != self.dimension {
                    return Err(DbError::DimensionMismatch {
                        expected: self.dimension,
                        actual: record.vector.len(),
                    });
                }
            }
        }

        let table = self.get_table()?;

        let mut start = 0;
        while start < files.len() {
            let mut end = start;
            let mut records = 0usize;
            while end < files.len() && end - start < MAX_FILES_PER_BATCH {
                let next = files[end].records.len();
                if end > start && records + next > MAX_RECORDS_PER_BATCH {
                    break;
                }
                records += next;
                end += 1;
            }
            self.upsert_sub_batch(&table, &files[start..end])?;
            start = end;
        }

        Ok(())
    }

    fn upsert_sub_batch(&self, table: &Table, files: &[FileChunks]) -> DbResult<()> {
        let all_records: Vec<&ChunkRecord> =
            files.iter().flat_map(|f| f.records.iter()).collect();

        debug!(
            "Upserting {} chunks across {} files",
            all_records.len(),
            files.len()
        );

        let delete_filter = files
            .iter()
            .map(|f| {
                if f.records.is_empty() {
                    format!("file_path = '{}'", escape(&f.path))
                } else {
                    format!(
                        "(file_path = '{}' AND file_hash != '{}')",
                        escape(&f.path),
                        escape(&f.hash)
                    )
                }
            })
            .collect::<Vec<_>>()
            .join(" OR ");

        self.runtime.block_on(async {
            if !all_records.is_empty() {
                let batch = records_to_batch(&all_records, self.dimension)?;
                let schema = batch.schema();
                let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
                table
                    .add(Box::new(batches))
                    .execute()
                    .await
                    .map_err(|e| DbError::lance(format!("Insert failed: {e}")))?;
            }

            table
                .delete(&delete_filter)
                .await
                .map_err(|e| DbError::lance(format!("Delete failed: {e}")))?;

            Ok(())
        })
    }

    /// Delete every record for the given files (tombstones).
    pub fn delete_files(&self, paths: &[String]) -> DbResult<()> {
        if paths.is_empty() {
            return Ok(());
        }

        debug!("Deleting vectors for {} files", paths.len());
        let table = self.get_table()?;

        for batch in paths.chunks(MAX_FILES_PER_BATCH) {
            let filter = batch
                .iter()
                .map(|p| format!("file_path = '{}'", escape(p)))
                .collect::<Vec<_>>()
                .join(" OR ");
            self.runtime.block_on(async {
                table
                    .delete(&filter)
                    .await
                    .map_err(|e| DbError::lance(format!("Delete failed: {e}")))
            })?;
        }
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Nearest-neighbor search, deduplicated, sorted by ascending distance.
    pub fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&str>,
    ) -> DbResult<Vec<ChunkHit>> {
        if query_vector.len() != self.dimension {
            return Err(DbError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        trace!("Vector search, k={k}");
        let table = self.get_table()?;

        let batches = self.runtime.block_on(async {
            let mut query = table
                .vector_search(query_vector.to_vec())
                .map_err(|e| DbError::lance(format!("Failed to create query: {e}")))?;
            if let Some(f) = filter {
                query = query.only_if(f.to_string());
            }
            let query = query
                .limit(k)
                .distance_type(lancedb::DistanceType::Cosine);
            let stream = query
                .execute()
                .await
                .map_err(|e| DbError::lance(format!("Query failed: {e}")))?;
            let batches: Vec<RecordBatch> = stream
                .try_collect()
                .await
                .map_err(|e| DbError::lance(format!("Failed to collect results: {e}")))?;
            Ok::<_, DbError>(batches)
        })?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(batch_to_hits(batch)?);
        }
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(dedup_hits(hits))
    }

    /// All chunks of one file, sorted by `chunk_index`.
    pub fn get_file_chunks(&self, path: &str) -> DbResult<Vec<StoredChunk>> {
        let mut by_file = self.get_files_chunks(std::slice::from_ref(&path.to_string()))?;
        Ok(by_file.remove(path).unwrap_or_default())
    }

    /// Chunks for many files in one scan per 100 paths, grouped by path and
    /// sorted by `chunk_index`.
    pub fn get_files_chunks(
        &self,
        paths: &[String],
    ) -> DbResult<HashMap<String, Vec<StoredChunk>>> {
        let mut grouped: HashMap<String, Vec<StoredChunk>> = HashMap::new();
        if paths.is_empty() {
            return Ok(grouped);
        }

        let table = self.get_table()?;

        for batch_paths in paths.chunks(100) {
            let list = batch_paths
                .iter()
                .map(|p| format!("'{}'", escape(p)))
                .collect::<Vec<_>>()
                .join(", ");
            let filter = format!("file_path IN ({list})");

            let batches = self.runtime.block_on(async {
                let stream = table
                    .query()
                    .only_if(filter)
                    .limit(SCAN_LIMIT)
                    .execute()
                    .await
                    .map_err(|e| DbError::lance(format!("Scan failed: {e}")))?;
                let batches: Vec<RecordBatch> = stream
                    .try_collect()
                    .await
                    .map_err(|e| DbError::lance(format!("Failed to collect scan: {e}")))?;
                Ok::<_, DbError>(batches)
            })?;

            for batch in &batches {
                for hit in batch_to_hits(batch)? {
                    grouped
                        .entry(hit.chunk.file_path.clone())
                        .or_default()
                        .push(hit.chunk);
                }
            }
        }

        for chunks in grouped.values_mut() {
            chunks.sort_by_key(|c| c.chunk_index);
            let deduped = dedup_chunks(std::mem::take(chunks));
            *chunks = deduped;
        }
        Ok(grouped)
    }

    /// Number of rows in the store.
    pub fn count(&self) -> DbResult<usize> {
        let table = self.get_table()?;
        self.runtime.block_on(async {
            table
                .count_rows(None)
                .await
                .map_err(|e| DbError::lance(format!("Count failed: {e}")))
        })
    }
}

// ============================================================================
// Arrow conversion
// ============================================================================

fn chunk_schema(dimension: usize) -> Schema {
    Schema::new(vec![
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("file_path", DataType::Utf8, false),
        Field::new("file_hash", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int64, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("display_code", DataType::Utf8, false),
        Field::new("vector_text", DataType::Utf8, false),
        Field::new("breadcrumb", DataType::Utf8, false),
        Field::new("language", DataType::Utf8, false),
        Field::new("start_index", DataType::Int64, false),
        Field::new("end_index", DataType::Int64, false),
        Field::new("raw_start", DataType::Int64, false),
        Field::new("raw_end", DataType::Int64, false),
        Field::new("vec_start", DataType::Int64, false),
        Field::new("vec_end", DataType::Int64, false),
    ])
}

fn vector_array(vectors: &[&[f32]], dimension: usize) -> DbResult<ArrayRef> {
    let flat: Vec<f32> = vectors.iter().flat_map(|v| v.iter().copied()).collect();
    let values = Float32Array::from(flat);
    let list = FixedSizeListArray::try_new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension as i32,
        Arc::new(values),
        None,
    )
    .map_err(|e| DbError::internal(format!("Failed to create vector array: {e}")))?;
    Ok(Arc::new(list))
}

fn empty_batch(schema: &Schema, dimension: usize) -> DbResult<RecordBatch> {
    let empty_str = || -> ArrayRef { Arc::new(StringArray::from(Vec::<&str>::new())) };
    let empty_i64 = || -> ArrayRef { Arc::new(Int64Array::from(Vec::<i64>::new())) };

    RecordBatch::try_new(
        Arc::new(schema.clone()),
        vec![
            empty_str(),
            empty_str(),
            empty_str(),
            empty_i64(),
            vector_array(&[], dimension)?,
            empty_str(),
            empty_str(),
            empty_str(),
            empty_str(),
            empty_i64(),
            empty_i64(),
            empty_i64(),
            empty_i64(),
            empty_i64(),
            empty_i64(),
        ],
    )
    .map_err(|e| DbError::internal(format!("Failed to create batch: {e}")))
}

fn records_to_batch(records: &[&ChunkRecord], dimension: usize) -> DbResult<RecordBatch> {
    let schema = chunk_schema(dimension);

    let str_col = |f: &dyn Fn(&ChunkRecord) -> String| -> ArrayRef {
        Arc::new(StringArray::from(
            records.iter().map(|r| f(r)).collect::<Vec<_>>(),
        ))
    };
    let i64_col = |f: &dyn Fn(&ChunkRecord) -> i64| -> ArrayRef {
        Arc::new(Int64Array::from(
            records.iter().map(|r| f(r)).collect::<Vec<_>>(),
        ))
    };

    let vectors: Vec<&[f32]> = records.iter().map(|r| r.vector.as_slice()).collect();

    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            str_col(&|r| r.chunk_id()),
            str_col(&|r| r.file_path.clone()),
            str_col(&|r| r.file_hash.clone()),
            i64_col(&|r| i64::from(r.chunk_index)),
            vector_array(&vectors, dimension)?,
            str_col(&|r| r.display_code.clone()),
            str_col(&|r| r.vector_text.clone()),
            str_col(&|r| r.breadcrumb.clone()),
            str_col(&|r| r.language.clone()),
            i64_col(&|r| i64::from(r.start_index)),
            i64_col(&|r| i64::from(r.end_index)),
            i64_col(&|r| i64::from(r.raw_start)),
            i64_col(&|r| i64::from(r.raw_end)),
            i64_col(&|r| i64::from(r.vec_start)),
            i64_col(&|r| i64::from(r.vec_end)),
        ],
    )
    .map_err(|e| DbError::internal(format!("Failed to create batch: {e}")))
}

fn batch_to_hits(batch: &RecordBatch) -> DbResult<Vec<ChunkHit>> {
    let str_col = |name: &str| -> DbResult<&StringArray> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| DbError::internal(format!("missing column {name}")))
    };
    let i64_col = |name: &str| -> DbResult<&Int64Array> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| DbError::internal(format!("missing column {name}")))
    };

    let chunk_ids = str_col("chunk_id")?;
    let file_paths = str_col("file_path")?;
    let file_hashes = str_col("file_hash")?;
    let chunk_indexes = i64_col("chunk_index")?;
    let display_codes = str_col("display_code")?;
    let breadcrumbs = str_col("breadcrumb")?;
    let languages = str_col("language")?;
    let start_indexes = i64_col("start_index")?;
    let end_indexes = i64_col("end_index")?;
    let raw_starts = i64_col("raw_start")?;
    let raw_ends = i64_col("raw_end")?;
    let vec_starts = i64_col("vec_start")?;
    let vec_ends = i64_col("vec_end")?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        hits.push(ChunkHit {
            chunk: StoredChunk {
                chunk_id: chunk_ids.value(i).to_string(),
                file_path: file_paths.value(i).to_string(),
                file_hash: file_hashes.value(i).to_string(),
                chunk_index: chunk_indexes.value(i) as u32,
                display_code: display_codes.value(i).to_string(),
                breadcrumb: breadcrumbs.value(i).to_string(),
                language: languages.value(i).to_string(),
                start_index: start_indexes.value(i) as u32,
                end_index: end_indexes.value(i) as u32,
                raw_start: raw_starts.value(i) as u32,
                raw_end: raw_ends.value(i) as u32,
                vec_start: vec_starts.value(i) as u32,
                vec_end: vec_ends.value(i) as u32,
            },
            distance: distances.map(|d| d.value(i)).unwrap_or(0.0),
        });
    }
    Ok(hits)
}

/// Escape a string literal for a LanceDB filter by doubling single quotes.
fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// Dedup hits by `chunk_id`, then by `(file_path, chunk_index)`, keeping the
/// first (closest) occurrence. Transient old/new coexistence during a
/// monotonic upsert collapses here.
fn dedup_hits(hits: Vec<ChunkHit>) -> Vec<ChunkHit> {
    let mut seen_ids = std::collections::HashSet::new();
    let mut seen_keys = std::collections::HashSet::new();
    hits.into_iter()
        .filter(|hit| {
            seen_ids.insert(hit.chunk.chunk_id.clone())
                && seen_keys.insert((hit.chunk.file_path.clone(), hit.chunk.chunk_index))
        })
        .collect()
}

fn dedup_chunks(chunks: Vec<StoredChunk>) -> Vec<StoredChunk> {
    let mut seen_ids = std::collections::HashSet::new();
    let mut seen_keys = std::collections::HashSet::new();
    chunks
        .into_iter()
        .filter(|c| {
            seen_ids.insert(c.chunk_id.clone())
                && seen_keys.insert((c.file_path.clone(), c.chunk_index))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
