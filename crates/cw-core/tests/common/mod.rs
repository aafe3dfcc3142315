//! Shared fixtures: deterministic in-process embedding and rerank doubles
//! plus a sandboxed engine (project root and data home in temp dirs).
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cw_core::{WeaverConfig, WeaverEngine};
use cw_model::{EmbeddingModel, ModelResult, RerankResult, RerankerModel};
use tempfile::TempDir;

pub const DIMS: usize = 16;

/// Character-trigram bag embedder: texts sharing identifier fragments land
/// close together under cosine distance, which is all recall needs.
#[derive(Debug)]
pub struct TrigramEmbedder {
    pub calls: Arc<AtomicUsize>,
}

impl TrigramEmbedder {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let folded: Vec<u8> = text
            .to_lowercase()
            .bytes()
            .filter(|b| b.is_ascii_alphanumeric())
            .collect();

        let mut vector = vec![0.0f32; DIMS];
        for window in folded.windows(3) {
            let bucket = window
                .iter()
                .fold(17usize, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as usize))
                % DIMS;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

impl EmbeddingModel for TrigramEmbedder {
    fn embed(&self, texts: &[String]) -> ModelResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        DIMS
    }

    fn model_id(&self) -> &str {
        "test-trigram-embedder"
    }
}

/// Token-containment reranker: the fraction of query words present in the
/// document, which keeps ordering deterministic.
#[derive(Debug)]
pub struct ContainmentReranker;

impl RerankerModel for ContainmentReranker {
    fn rerank(&self, query: &str, documents: &[String]) -> ModelResult<Vec<RerankResult>> {
        let words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(|w| w.to_string())
            .collect();

        let mut results: Vec<RerankResult> = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| {
                let lower = doc.to_lowercase();
                let hits = words.iter().filter(|w| lower.contains(w.as_str())).count();
                let relevance_score = if words.is_empty() {
                    0.0
                } else {
                    hits as f32 / words.len() as f32
                };
                RerankResult {
                    index,
                    relevance_score,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.index.cmp(&b.index))
        });
        results.truncate(self.top_n());
        Ok(results)
    }

    fn top_n(&self) -> usize {
        10
    }

    fn model_id(&self) -> &str {
        "test-containment-reranker"
    }
}

/// A sandboxed engine plus its temp dirs and the embed-call counter.
pub struct TestEnv {
    pub engine: WeaverEngine,
    pub project: TempDir,
    pub home: TempDir,
    pub embed_calls: Arc<AtomicUsize>,
}

pub fn test_env() -> TestEnv {
    let project = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    let (embedder, embed_calls) = TrigramEmbedder::new();

    let engine = WeaverEngine::with_home_dir(
        WeaverConfig::default(),
        home.path().to_path_buf(),
        Some(Box::new(embedder)),
        Some(Box::new(ContainmentReranker)),
    )
    .unwrap();

    TestEnv {
        engine,
        project,
        home,
        embed_calls,
    }
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}
