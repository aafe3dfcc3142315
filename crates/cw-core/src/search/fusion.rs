//! Reciprocal Rank Fusion and the smart top-K cutoff.
//!
//! Fusion merges the vector and lexical recall rankings: each result at
//! 0-based rank `r` contributes `weight / (k0 + r)`, contributions sum per
//! `(file_path, chunk_index)` key, and ties break lexicographically so a
//! query run twice returns the identical ordering.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::SearchConfig;

/// Identity of a chunk across stores.
pub type ChunkKey = (String, u32);

/// Which recall branch contributed most to a fused candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecallSource {
    Vector,
    Lexical,
}

/// A candidate after RRF fusion.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub key: ChunkKey,
    pub score: f32,
    pub source: RecallSource,
}

/// Fuse the two recall rankings.
pub fn rrf_fuse(
    vector_ranked: &[ChunkKey],
    lexical_ranked: &[ChunkKey],
    config: &SearchConfig,
) -> Vec<FusedCandidate> {
    let k0 = config.rrf_k0;
    let mut fused: HashMap<ChunkKey, (f32, f32, RecallSource)> = HashMap::new();

    for (rank, key) in vector_ranked.iter().enumerate() {
        let contrib = config.w_vec / (k0 + rank as f32);
        let entry = fused
            .entry(key.clone())
            .or_insert((0.0, 0.0, RecallSource::Vector));
        entry.0 += contrib;
        if contrib > entry.1 {
            entry.1 = contrib;
            entry.2 = RecallSource::Vector;
        }
    }

    for (rank, key) in lexical_ranked.iter().enumerate() {
        let contrib = config.w_lex / (k0 + rank as f32);
        let entry = fused
            .entry(key.clone())
            .or_insert((0.0, 0.0, RecallSource::Lexical));
        entry.0 += contrib;
        if contrib > entry.1 {
            entry.1 = contrib;
            entry.2 = RecallSource::Lexical;
        }
    }

    let mut candidates: Vec<FusedCandidate> = fused
        .into_iter()
        .map(|(key, (score, _, source))| FusedCandidate { key, score, source })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    candidates
}

/// Dynamic top-K selection over rerank-scored candidates (sorted
/// descending).
///
/// Anchors: an absolute `floor`, a `ratio` of the top score, and an
/// absolute `delta` below it. Below `smart_min_k` only the floor applies;
/// after that candidates must clear `max(floor, min(ratio_t, delta_t))`,
/// and the walk stops at the first reject.
pub fn smart_cutoff(ranked: &[(ChunkKey, f32)], config: &SearchConfig) -> Vec<(ChunkKey, f32)> {
    let Some((_, top)) = ranked.first() else {
        return Vec::new();
    };
    let top = *top;
    let floor = config.smart_min_score;

    if top < floor {
        return vec![ranked[0].clone()];
    }

    let ratio_t = top * config.smart_top_score_ratio;
    let delta_t = top - config.smart_top_score_delta_abs;
    let dynamic = floor.max(ratio_t.min(delta_t));

    let mut selected: Vec<(ChunkKey, f32)> = Vec::new();
    let mut seen: std::collections::HashSet<ChunkKey> = std::collections::HashSet::new();

    for (i, (key, score)) in ranked.iter().enumerate() {
        let threshold = if i < config.smart_min_k { floor } else { dynamic };
        if *score < threshold {
            break;
        }
        if seen.insert(key.clone()) {
            selected.push((key.clone(), *score));
        }
        if selected.len() >= config.smart_max_k {
            return selected;
        }
    }

    // Top up to the minimum seed count from what's left above the floor.
    let target = config.smart_min_k.min(config.smart_max_k);
    if selected.len() < target {
        for (key, score) in ranked {
            if selected.len() >= target {
                break;
            }
            if *score >= floor && seen.insert(key.clone()) {
                selected.push((key.clone(), *score));
            }
        }
    }

    selected
}

// ============================================================================
// Tests
// ============================================================================
