//! Hybrid search: parallel vector + lexical recall, RRF fusion, reranking,
//! smart cutoff, graph expansion, and context packing.

pub mod fusion;
pub mod query;

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use cw_db::{ChunkStore, RowStore, StoredChunk};
use cw_model::{EmbeddingModel, RerankerModel};

use crate::config::{PackConfig, SearchConfig};
use crate::errors::CwResult;
use crate::expand::{ExpandedChunk, GraphExpander};
use crate::pack::{ContextPacker, PackedFile};

use fusion::{rrf_fuse, smart_cutoff, ChunkKey};
use query::{extract_around_hit, segment_query, token_overlap_score, truncate_middle};

/// Rerank payload budget: breadcrumb header + windowed code.
const RERANK_BREADCRUMB_MAX: usize = 250;
const RERANK_PAYLOAD_MAX: usize = 1000;

/// A rerank-scored seed chunk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    pub chunk: StoredChunk,
    /// Rerank relevance score.
    pub score: f32,
}

/// Diagnostic block attached to every context pack.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDebug {
    pub tokens: Vec<String>,
    pub w_vec: f32,
    pub w_lex: f32,
    pub k0: f32,
    pub vector_candidates: usize,
    pub lexical_candidates: usize,
    pub fused_candidates: usize,
    pub reranked: usize,
}

/// The assembled answer context for one query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPack {
    pub query: String,
    pub seeds: Vec<Seed>,
    pub expanded: Vec<ExpandedChunk>,
    pub files: Vec<PackedFile>,
    pub debug: SearchDebug,
}

/// One query's worth of search over a project's stores.
pub struct SearchService<'a> {
    pub row_store: &'a RowStore,
    pub chunk_store: &'a ChunkStore,
    pub embedder: &'a dyn EmbeddingModel,
    pub reranker: &'a dyn RerankerModel,
    pub expander: &'a GraphExpander,
    pub config: &'a SearchConfig,
    pub pack_config: &'a PackConfig,
}

impl SearchService<'_> {
    /// Run the full pipeline for `query`.
    pub fn build_context_pack(&self, query_text: &str) -> CwResult<ContextPack> {
        let tokens = segment_query(query_text);
        debug!("Query segmented into {} tokens", tokens.len());

        // The two recall branches run concurrently and join before fusion.
        // The vector branch moves to a scoped thread; the lexical branch
        // stays here because the SQLite connection is single-threaded.
        let embedder = self.embedder;
        let chunk_store = self.chunk_store;
        let config = self.config;
        let (vector_result, lexical_result) = std::thread::scope(|scope| {
            let vector_branch =
                scope.spawn(move || vector_recall(embedder, chunk_store, config, query_text));
            let lexical = self.lexical_recall(&tokens);
            let vector = match vector_branch.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            (vector, lexical)
        });
        let vector_hits = vector_result?;
        let lexical_hits = lexical_result?;

        let vector_count = vector_hits.len();
        let lexical_count = lexical_hits.len();

        // Chunk bodies seen so far, keyed for fusion.
        let mut known_chunks: HashMap<ChunkKey, StoredChunk> = HashMap::new();
        let vector_ranked: Vec<ChunkKey> = vector_hits
            .into_iter()
            .map(|(chunk, _similarity)| {
                let key = (chunk.file_path.clone(), chunk.chunk_index);
                known_chunks.entry(key.clone()).or_insert(chunk);
                key
            })
            .collect();
        let lexical_ranked: Vec<ChunkKey> = lexical_hits
            .into_iter()
            .map(|(key, chunk)| {
                if let Some(chunk) = chunk {
                    known_chunks.entry(key.clone()).or_insert(chunk);
                }
                key
            })
            .collect();

        let fused = rrf_fuse(&vector_ranked, &lexical_ranked, self.config);
        let fused_count = fused.len();
        let top_fused: Vec<ChunkKey> = fused
            .into_iter()
            .take(self.config.fused_top_m)
            .map(|c| c.key)
            .collect();

        self.hydrate_chunks(&top_fused, &mut known_chunks)?;
        let candidates: Vec<StoredChunk> = top_fused
            .iter()
            .filter_map(|key| known_chunks.get(key).cloned())
            .collect();

        // Rerank and select seeds.
        let ranked = self.rerank(query_text, &tokens, &candidates)?;
        let reranked_count = ranked.len();
        let cut = smart_cutoff(&ranked, self.config);

        let seeds: Vec<Seed> = cut
            .into_iter()
            .filter_map(|(key, score)| {
                known_chunks.get(&key).map(|chunk| Seed {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect();

        let expanded =
            self.expander
                .expand(&seeds, &tokens, self.row_store, self.chunk_store)?;

        // Pack seeds and expansions into file segments.
        let mut pack_input: Vec<(StoredChunk, f32)> = seeds
            .iter()
            .map(|s| (s.chunk.clone(), s.score))
            .collect();
        pack_input.extend(expanded.iter().map(|e| (e.chunk.clone(), e.score)));
        let packer = ContextPacker::new(self.pack_config.clone());
        let files = packer.pack(&pack_input, self.row_store)?;

        Ok(ContextPack {
            query: query_text.to_string(),
            seeds,
            expanded,
            files,
            debug: SearchDebug {
                tokens,
                w_vec: self.config.w_vec,
                w_lex: self.config.w_lex,
                k0: self.config.rrf_k0,
                vector_candidates: vector_count,
                lexical_candidates: lexical_count,
                fused_candidates: fused_count,
                reranked: reranked_count,
            },
        })
    }

    /// Lexical recall: `chunks_fts` directly, falling back to `files_fts`
    /// plus per-file token-overlap selection when the chunk table has
    /// nothing for this project yet.
    fn lexical_recall(
        &self,
        tokens: &[String],
    ) -> CwResult<Vec<(ChunkKey, Option<StoredChunk>)>> {
        let direct = self
            .row_store
            .search_chunks_fts(tokens, self.config.lex_total_chunks)?;
        if !direct.is_empty() {
            return Ok(direct
                .into_iter()
                .map(|hit| ((hit.file_path, hit.chunk_index), None))
                .collect());
        }

        let files = self
            .row_store
            .search_files_fts(tokens, self.config.fts_top_k_files)?;
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let paths: Vec<String> = files.iter().map(|f| f.path.clone()).collect();
        let mut by_file = self.chunk_store.get_files_chunks(&paths)?;

        let mut out: Vec<(ChunkKey, Option<StoredChunk>)> = Vec::new();
        for file in &files {
            if out.len() >= self.config.lex_total_chunks {
                break;
            }
            let Some(chunks) = by_file.remove(&file.path) else {
                continue;
            };

            let mut scored: Vec<(f32, StoredChunk)> = chunks
                .into_iter()
                .map(|chunk| {
                    let text = format!("{} {}", chunk.breadcrumb, chunk.display_code);
                    (token_overlap_score(&text, tokens), chunk)
                })
                .collect();
            scored.sort_by(|a, b| {
                b.0.partial_cmp(&a.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.1.chunk_index.cmp(&b.1.chunk_index))
            });

            // A file whose best chunk has zero overlap contributes nothing.
            if scored.first().map(|(s, _)| *s <= 0.0).unwrap_or(true) {
                continue;
            }

            for (score, chunk) in scored.into_iter().take(self.config.lex_chunks_per_file) {
                if score <= 0.0 || out.len() >= self.config.lex_total_chunks {
                    break;
                }
                out.push(((chunk.file_path.clone(), chunk.chunk_index), Some(chunk)));
            }
        }
        Ok(out)
    }

    /// Fetch chunk bodies for fused keys that only the FTS side has seen.
    fn hydrate_chunks(
        &self,
        keys: &[ChunkKey],
        known: &mut HashMap<ChunkKey, StoredChunk>,
    ) -> CwResult<()> {
        let missing_files: Vec<String> = {
            let mut files: Vec<String> = keys
                .iter()
                .filter(|key| !known.contains_key(*key))
                .map(|(path, _)| path.clone())
                .collect();
            files.sort();
            files.dedup();
            files
        };
        if missing_files.is_empty() {
            return Ok(());
        }

        let fetched = self.chunk_store.get_files_chunks(&missing_files)?;
        for chunks in fetched.into_values() {
            for chunk in chunks {
                known
                    .entry((chunk.file_path.clone(), chunk.chunk_index))
                    .or_insert(chunk);
            }
        }
        Ok(())
    }

    /// Rerank candidates; returns `(key, score)` sorted descending with
    /// deterministic tie-breaks.
    fn rerank(
        &self,
        query_text: &str,
        tokens: &[String],
        candidates: &[StoredChunk],
    ) -> CwResult<Vec<(ChunkKey, f32)>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<String> = candidates
            .iter()
            .map(|chunk| {
                let breadcrumb = truncate_middle(&chunk.breadcrumb, RERANK_BREADCRUMB_MAX);
                let body_budget =
                    RERANK_PAYLOAD_MAX.saturating_sub(breadcrumb.chars().count() + 1);
                let body = extract_around_hit(&chunk.display_code, tokens, body_budget);
                format!("{breadcrumb}\n{body}")
            })
            .collect();

        let results = self.reranker.rerank(query_text, &documents)?;

        let mut ranked: Vec<(ChunkKey, f32)> = Vec::with_capacity(results.len());
        for result in results {
            match candidates.get(result.index) {
                Some(chunk) => ranked.push((
                    (chunk.file_path.clone(), chunk.chunk_index),
                    result.relevance_score,
                )),
                // An index out of range is a service bug; drop the entry.
                None => warn!("Reranker returned out-of-range index {}", result.index),
            }
        }

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(ranked)
    }
}

/// Dense recall: embed the query, take the closest `vector_top_m` of
/// `vector_top_k`, similarity `1 / (1 + distance)`.
fn vector_recall(
    embedder: &dyn EmbeddingModel,
    chunk_store: &ChunkStore,
    config: &SearchConfig,
    query_text: &str,
) -> CwResult<Vec<(StoredChunk, f32)>> {
    let vector = embedder.embed_query(query_text)?;
    let hits = chunk_store.search(&vector, config.vector_top_k, None)?;
    Ok(hits
        .into_iter()
        .take(config.vector_top_m)
        .map(|hit| {
            let similarity = 1.0 / (1.0 + hit.distance);
            (hit.chunk, similarity)
        })
        .collect())
}
