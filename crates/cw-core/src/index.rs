//! Vector indexing: embed chunk texts, upsert records, mirror chunk FTS
//! rows, and commit `vector_index_hash`.
//!
//! The commit point ordering is what makes crashes recoverable: vectors are
//! written first (monotonically), then the chunk FTS rows and
//! `vector_index_hash` move in the row store. A crash between the two
//! leaves `vector_index_hash != hash`, which the next scan picks up as a
//! self-heal candidate and re-embeds.

use tracing::{debug, info};

use cw_db::{ChunkFtsRow, ChunkRecord, ChunkStore, FileChunks, RowStore};
use cw_model::EmbeddingModel;

use crate::chunk::ProcessedChunk;
use crate::errors::CwResult;
use crate::scan::VectorIndexStats;

/// Files are flushed to the vector store in groups of this many.
const INDEX_FLUSH_FILES: usize = 50;

/// One file queued for (re)indexing.
#[derive(Debug, Clone)]
pub struct IndexFile {
    pub path: String,
    pub hash: String,
    pub chunks: Vec<ProcessedChunk>,
}

/// The vector indexing phase of a scan.
pub struct Indexer<'a> {
    embedder: &'a dyn EmbeddingModel,
    chunk_store: &'a ChunkStore,
}

impl<'a> Indexer<'a> {
    /// Create an indexer over the project's chunk store.
    pub fn new(embedder: &'a dyn EmbeddingModel, chunk_store: &'a ChunkStore) -> Self {
        Self {
            embedder,
            chunk_store,
        }
    }

    /// Embed and upsert the given files, committing FTS rows and
    /// `vector_index_hash` per flushed group.
    pub fn index_files(
        &self,
        row_store: &mut RowStore,
        files: Vec<IndexFile>,
    ) -> CwResult<VectorIndexStats> {
        let mut stats = VectorIndexStats::default();
        if files.is_empty() {
            return Ok(stats);
        }

        info!("Indexing vectors for {} files", files.len());

        let mut pending: Vec<(IndexFile, Vec<Vec<f32>>)> = Vec::new();
        for file in files {
            let texts: Vec<String> = file.chunks.iter().map(|c| c.vector_text.clone()).collect();
            let vectors = self.embedder.embed(&texts)?;
            pending.push((file, vectors));

            if pending.len() >= INDEX_FLUSH_FILES {
                self.flush(row_store, &mut pending, &mut stats)?;
            }
        }
        self.flush(row_store, &mut pending, &mut stats)?;

        Ok(stats)
    }

    /// Purge vector records and chunk FTS rows for deleted files.
    pub fn remove_files(
        &self,
        row_store: &mut RowStore,
        paths: &[String],
    ) -> CwResult<usize> {
        if paths.is_empty() {
            return Ok(0);
        }
        debug!("Removing vectors for {} deleted files", paths.len());
        self.chunk_store.delete_files(paths)?;
        row_store.delete_chunk_fts(paths)?;
        Ok(paths.len())
    }

    fn flush(
        &self,
        row_store: &mut RowStore,
        pending: &mut Vec<(IndexFile, Vec<Vec<f32>>)>,
        stats: &mut VectorIndexStats,
    ) -> CwResult<()> {
        if pending.is_empty() {
            return Ok(());
        }

        let batch: Vec<FileChunks> = pending
            .iter()
            .map(|(file, vectors)| FileChunks {
                path: file.path.clone(),
                hash: file.hash.clone(),
                records: file
                    .chunks
                    .iter()
                    .zip(vectors.iter())
                    .map(|(chunk, vector)| to_record(file, chunk, vector.clone()))
                    .collect(),
            })
            .collect();

        self.chunk_store.batch_upsert_files(&batch)?;

        // Vectors are durable; now move the row-store commit point.
        for (file, _) in pending.iter() {
            let fts_rows: Vec<ChunkFtsRow> = file
                .chunks
                .iter()
                .map(|chunk| ChunkFtsRow {
                    chunk_id: cw_db::chunk_id(&file.path, &file.hash, chunk.chunk_index),
                    chunk_index: chunk.chunk_index,
                    breadcrumb: chunk.breadcrumb.clone(),
                    content: chunk.display_code.clone(),
                })
                .collect();
            row_store.replace_chunk_fts(&file.path, &fts_rows)?;
            row_store.set_vector_index_hash(&file.path, &file.hash)?;

            stats.indexed += 1;
            stats.chunks += file.chunks.len();
        }

        pending.clear();
        Ok(())
    }
}

fn to_record(file: &IndexFile, chunk: &ProcessedChunk, vector: Vec<f32>) -> ChunkRecord {
    ChunkRecord {
        file_path: file.path.clone(),
        file_hash: file.hash.clone(),
        chunk_index: chunk.chunk_index,
        vector,
        display_code: chunk.display_code.clone(),
        vector_text: chunk.vector_text.clone(),
        breadcrumb: chunk.breadcrumb.clone(),
        language: chunk.language.clone(),
        start_index: chunk.start_index,
        end_index: chunk.end_index,
        raw_start: chunk.raw_start,
        raw_end: chunk.raw_end,
        vec_start: chunk.vec_start,
        vec_end: chunk.vec_end,
    }
}
