//! Graph expansion: grow the seed set along three edge families.
//!
//! - **E1** same-file neighbors by chunk index.
//! - **E2** breadcrumb siblings sharing the seed's parent prefix.
//! - **E3** the import graph, breadth-first, two hops, where the second hop
//!   only passes through barrel files (`index.*`, `__init__.py`, `mod.rs`).
//!
//! Every expansion carries a decayed score derived from its originating
//! seed and is deduplicated against the seeds by `(file_path, chunk_index)`.

pub mod resolvers;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::OnceLock;

use serde::Serialize;
use tracing::debug;

use cw_db::{ChunkStore, RowStore, StoredChunk};

use crate::config::ExpandConfig;
use crate::errors::CwResult;
use crate::search::fusion::ChunkKey;
use crate::search::query::token_overlap_score;
use crate::search::Seed;

use resolvers::resolver_for;

/// Which edge family produced an expanded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpandOrigin {
    Neighbor,
    BreadcrumbSibling,
    Import,
}

/// A chunk added by expansion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedChunk {
    pub chunk: StoredChunk,
    pub score: f32,
    pub origin: ExpandOrigin,
}

/// Barrel file: a module re-export entry point.
pub fn is_barrel_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    if name == "__init__.py" || name == "mod.rs" {
        return true;
    }
    matches!(
        name,
        "index.ts"
            | "index.tsx"
            | "index.js"
            | "index.jsx"
            | "index.mts"
            | "index.mjs"
            | "index.cts"
            | "index.cjs"
    )
}

/// Per-project graph expander. The project path set is loaded once and
/// cached until the engine invalidates the expander on reindex.
pub struct GraphExpander {
    config: ExpandConfig,
    path_set: OnceLock<HashSet<String>>,
}

impl GraphExpander {
    /// Create an expander.
    pub fn new(config: ExpandConfig) -> Self {
        Self {
            config,
            path_set: OnceLock::new(),
        }
    }

    /// Run all three expansions for the given seeds.
    pub fn expand(
        &self,
        seeds: &[Seed],
        query_tokens: &[String],
        row_store: &RowStore,
        chunk_store: &ChunkStore,
    ) -> CwResult<Vec<ExpandedChunk>> {
        if seeds.is_empty() {
            return Ok(Vec::new());
        }

        let seed_keys: HashSet<ChunkKey> = seeds
            .iter()
            .map(|s| (s.chunk.file_path.clone(), s.chunk.chunk_index))
            .collect();

        // Best expansion per key across all three families.
        let mut best: HashMap<ChunkKey, ExpandedChunk> = HashMap::new();
        let mut admit = |chunk: StoredChunk, score: f32, origin: ExpandOrigin| {
            let key = (chunk.file_path.clone(), chunk.chunk_index);
            if seed_keys.contains(&key) {
                return;
            }
            match best.get(&key) {
                Some(existing) if existing.score >= score => {}
                _ => {
                    best.insert(key, ExpandedChunk { chunk, score, origin });
                }
            }
        };

        // Chunks of every seed file, fetched in one batch.
        let seed_files: Vec<String> = {
            let mut files: Vec<String> =
                seeds.iter().map(|s| s.chunk.file_path.clone()).collect();
            files.sort();
            files.dedup();
            files
        };
        let file_chunks = chunk_store.get_files_chunks(&seed_files)?;

        self.expand_neighbors(seeds, &seed_keys, &file_chunks, &mut admit);
        self.expand_breadcrumb_siblings(seeds, &seed_keys, &file_chunks, &mut admit);
        self.expand_imports(
            seeds,
            query_tokens,
            row_store,
            chunk_store,
            &seed_files,
            &mut admit,
        )?;

        let mut expanded: Vec<ExpandedChunk> = best.into_values().collect();
        expanded.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    (a.chunk.file_path.as_str(), a.chunk.chunk_index)
                        .cmp(&(b.chunk.file_path.as_str(), b.chunk.chunk_index))
                })
        });
        debug!("Expansion added {} chunks", expanded.len());
        Ok(expanded)
    }

    /// E1: chunks adjacent to a seed by index, decayed per hop.
    fn expand_neighbors(
        &self,
        seeds: &[Seed],
        seed_keys: &HashSet<ChunkKey>,
        file_chunks: &HashMap<String, Vec<StoredChunk>>,
        admit: &mut impl FnMut(StoredChunk, f32, ExpandOrigin),
    ) {
        let mut max_score_per_file: HashMap<&str, f32> = HashMap::new();
        for seed in seeds {
            let entry = max_score_per_file
                .entry(seed.chunk.file_path.as_str())
                .or_insert(f32::MIN);
            *entry = entry.max(seed.score);
        }

        for seed in seeds {
            let Some(chunks) = file_chunks.get(&seed.chunk.file_path) else {
                continue;
            };
            let by_index: HashMap<u32, &StoredChunk> =
                chunks.iter().map(|c| (c.chunk_index, c)).collect();
            let max_score = max_score_per_file[seed.chunk.file_path.as_str()];

            for distance in 1..=self.config.neighbor_hops {
                let d = distance as u32;
                let score = max_score * self.config.decay_neighbor.powi(distance as i32);
                for neighbor_index in [
                    seed.chunk.chunk_index.checked_sub(d),
                    seed.chunk.chunk_index.checked_add(d),
                ]
                .into_iter()
                .flatten()
                {
                    let key = (seed.chunk.file_path.clone(), neighbor_index);
                    if seed_keys.contains(&key) {
                        continue;
                    }
                    if let Some(chunk) = by_index.get(&neighbor_index) {
                        admit((*chunk).clone(), score, ExpandOrigin::Neighbor);
                    }
                }
            }
        }
    }

    /// E2: chunks whose breadcrumb shares the seed's parent prefix.
    fn expand_breadcrumb_siblings(
        &self,
        seeds: &[Seed],
        seed_keys: &HashSet<ChunkKey>,
        file_chunks: &HashMap<String, Vec<StoredChunk>>,
        admit: &mut impl FnMut(StoredChunk, f32, ExpandOrigin),
    ) {
        // Group seeds by (file, parent prefix).
        let mut groups: HashMap<(String, String), f32> = HashMap::new();
        for seed in seeds {
            let Some(prefix) = parent_prefix(&seed.chunk.breadcrumb) else {
                continue;
            };
            let key = (seed.chunk.file_path.clone(), prefix);
            let entry = groups.entry(key).or_insert(f32::MIN);
            *entry = entry.max(seed.score);
        }

        for ((file, prefix), max_score) in groups {
            let Some(chunks) = file_chunks.get(&file) else {
                continue;
            };
            let score = max_score * self.config.decay_breadcrumb;
            let mut taken = 0;
            for chunk in chunks {
                if taken >= self.config.breadcrumb_expand_limit {
                    break;
                }
                if parent_prefix(&chunk.breadcrumb).as_deref() != Some(prefix.as_str()) {
                    continue;
                }
                let key = (chunk.file_path.clone(), chunk.chunk_index);
                if seed_keys.contains(&key) {
                    continue;
                }
                admit(chunk.clone(), score, ExpandOrigin::BreadcrumbSibling);
                taken += 1;
            }
        }
    }

    /// E3: BFS over the import graph, two hops, barrel-gated second hop.
    fn expand_imports(
        &self,
        seeds: &[Seed],
        query_tokens: &[String],
        row_store: &RowStore,
        chunk_store: &ChunkStore,
        seed_files: &[String],
        admit: &mut impl FnMut(StoredChunk, f32, ExpandOrigin),
    ) -> CwResult<()> {
        let paths = self.paths(row_store)?;

        // One queue entry per seed file, carrying the best seed score.
        let mut best_per_file: HashMap<&str, f32> = HashMap::new();
        for seed in seeds {
            let entry = best_per_file
                .entry(seed.chunk.file_path.as_str())
                .or_insert(f32::MIN);
            *entry = entry.max(seed.score);
        }

        let mut visited: HashSet<String> = seed_files.iter().cloned().collect();
        let mut queue: VecDeque<(String, usize, f32)> = seed_files
            .iter()
            .map(|f| (f.clone(), 0, best_per_file[f.as_str()]))
            .collect();

        while let Some((file, depth, seed_score)) = queue.pop_front() {
            if depth >= 2 {
                continue;
            }
            // The second hop only passes through barrel files.
            if depth == 1 && !is_barrel_file(&file) {
                continue;
            }
            let budget = if depth == 0 {
                self.config.import_files_per_seed
            } else {
                self.config.import_files_per_seed.min(2)
            };

            let Some(resolver) = resolver_for(&file) else {
                continue;
            };
            let Some(content) = row_store.get_content(&file)? else {
                continue;
            };

            let mut followed = 0;
            for import in resolver.extract(&content) {
                if followed >= budget {
                    break;
                }
                let Some(target) = resolver.resolve(&import, &file, paths) else {
                    continue;
                };
                if !visited.insert(target.clone()) {
                    continue;
                }
                followed += 1;

                let chunks = chunk_store.get_file_chunks(&target)?;
                let depth_decay = if depth == 0 {
                    1.0
                } else {
                    self.config.decay_depth
                };
                let score = seed_score * self.config.decay_import * depth_decay;
                for chunk in self.select_import_chunks(chunks, query_tokens) {
                    admit(chunk, score, ExpandOrigin::Import);
                }

                queue.push_back((target, depth + 1, seed_score));
            }
        }
        Ok(())
    }

    /// Up to `chunks_per_import_file` chunks from a resolved target: the
    /// best token-overlap matches (in file order) when tokens are known,
    /// else the first chunks by index.
    fn select_import_chunks(
        &self,
        chunks: Vec<StoredChunk>,
        query_tokens: &[String],
    ) -> Vec<StoredChunk> {
        let limit = self.config.chunks_per_import_file;
        if query_tokens.is_empty() {
            let mut chunks = chunks;
            chunks.truncate(limit);
            return chunks;
        }

        let mut scored: Vec<(f32, StoredChunk)> = chunks
            .into_iter()
            .map(|chunk| {
                let text = format!("{} {}", chunk.breadcrumb, chunk.display_code);
                (token_overlap_score(&text, query_tokens), chunk)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.chunk_index.cmp(&b.1.chunk_index))
        });
        scored.truncate(limit);
        // Output in file order.
        scored.sort_by_key(|(_, chunk)| chunk.chunk_index);
        scored.into_iter().map(|(_, chunk)| chunk).collect()
    }

    fn paths(&self, row_store: &RowStore) -> CwResult<&HashSet<String>> {
        if let Some(paths) = self.path_set.get() {
            return Ok(paths);
        }
        let loaded: HashSet<String> = row_store.all_paths()?.into_iter().collect();
        Ok(self.path_set.get_or_init(|| loaded))
    }
}

/// Breadcrumb parent prefix: everything above the last component, `None`
/// for single-component breadcrumbs.
fn parent_prefix(breadcrumb: &str) -> Option<String> {
    let parts: Vec<&str> = breadcrumb.split(" > ").collect();
    if parts.len() <= 1 {
        return None;
    }
    Some(parts[..parts.len() - 1].join(" > "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barrel_detection() {
        assert!(is_barrel_file("src/components/index.ts"));
        assert!(is_barrel_file("pkg/__init__.py"));
        assert!(is_barrel_file("src/chunk/mod.rs"));
        assert!(is_barrel_file("index.js"));
        assert!(!is_barrel_file("src/main.rs"));
        assert!(!is_barrel_file("src/reindex.py"));
    }

    #[test]
    fn parent_prefix_extraction() {
        assert_eq!(
            parent_prefix("a.ts > class Foo > method bar"),
            Some("a.ts > class Foo".to_string())
        );
        assert_eq!(parent_prefix("a.ts > class Foo"), Some("a.ts".to_string()));
        assert_eq!(parent_prefix("a.ts"), None);
    }
}
