//! Remote embedding client.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::{ModelError, ModelResult};
use crate::http::{default_client, send_with_retry};
use crate::EmbeddingModel;

/// Embedding client backed by an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug)]
pub struct RemoteEmbeddingModel {
    config: EmbeddingConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl RemoteEmbeddingModel {
    /// Create a new embedding client.
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config,
            client: default_client(),
        }
    }

    fn embed_batch_http(&self, batch: &[String]) -> ModelResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url);
        let body = EmbeddingRequest {
            model: &self.config.model_id,
            input: batch,
            dimensions: self.config.dimensions,
        };

        let response = send_with_retry("embedding", || {
            let mut request = self.client.post(&url).json(&body);
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }
            request.send()
        })?;

        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| ModelError::invalid_response("embedding", e.to_string()))?;

        if parsed.data.len() != batch.len() {
            return Err(ModelError::invalid_response(
                "embedding",
                format!("expected {} vectors, got {}", batch.len(), parsed.data.len()),
            ));
        }

        // The service reports each vector's position; restore request order.
        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; batch.len()];
        for item in parsed.data {
            if item.embedding.len() != self.config.dimensions {
                return Err(ModelError::DimensionMismatch {
                    expected: self.config.dimensions,
                    actual: item.embedding.len(),
                });
            }
            match vectors.get_mut(item.index) {
                Some(slot) => *slot = Some(item.embedding),
                None => {
                    return Err(ModelError::invalid_response(
                        "embedding",
                        format!("vector index {} out of range", item.index),
                    ))
                }
            }
        }

        vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                v.ok_or_else(|| {
                    ModelError::invalid_response("embedding", format!("missing vector {i}"))
                })
            })
            .collect()
    }
}

impl EmbeddingModel for RemoteEmbeddingModel {
    fn embed(&self, texts: &[String]) -> ModelResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts", texts.len());

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            vectors.extend(self.embed_batch_http(batch)?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.dimensions
    }

    fn model_id(&self) -> &str {
        &self.config.model_id
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::{http_response, spawn_mock_server};

    fn model(port: u16, dimensions: usize, batch_size: usize) -> RemoteEmbeddingModel {
        RemoteEmbeddingModel::new(EmbeddingConfig {
            base_url: format!("http://127.0.0.1:{port}/v1"),
            api_key: None,
            model_id: "test-embed".to_string(),
            dimensions,
            batch_size,
        })
    }

    fn texts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn embed_restores_request_order() {
        // The service reports vectors out of order; indexes restore it.
        let body = r#"{"data":[
            {"index":1,"embedding":[1.0,1.0]},
            {"index":0,"embedding":[0.0,0.5]}
        ]}"#;
        let port = spawn_mock_server(vec![http_response("200 OK", body)]);

        let vectors = model(port, 2, 32).embed(&texts(&["a", "b"])).unwrap();
        assert_eq!(vectors, vec![vec![0.0, 0.5], vec![1.0, 1.0]]);
    }

    #[test]
    fn embed_rejects_dimension_mismatch() {
        let body = r#"{"data":[{"index":0,"embedding":[1.0,2.0]}]}"#;
        let port = spawn_mock_server(vec![http_response("200 OK", body)]);

        let result = model(port, 4, 32).embed(&texts(&["a"]));
        match result {
            Err(ModelError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 2);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn embed_rejects_out_of_range_index() {
        let body = r#"{"data":[{"index":5,"embedding":[1.0,2.0]}]}"#;
        let port = spawn_mock_server(vec![http_response("200 OK", body)]);

        let result = model(port, 2, 32).embed(&texts(&["a"]));
        assert!(
            matches!(result, Err(ModelError::InvalidResponse { .. })),
            "got {result:?}"
        );
    }

    #[test]
    fn embed_rejects_wrong_vector_count() {
        let body = r#"{"data":[{"index":0,"embedding":[1.0,2.0]}]}"#;
        let port = spawn_mock_server(vec![http_response("200 OK", body)]);

        let result = model(port, 2, 32).embed(&texts(&["a", "b"]));
        match result {
            Err(ModelError::InvalidResponse { message, .. }) => {
                assert!(message.contains("expected 2"), "message: {message}");
            }
            other => panic!("expected InvalidResponse, got {other:?}"),
        }
    }

    #[test]
    fn embed_rejects_duplicate_index_leaving_a_hole() {
        let body = r#"{"data":[
            {"index":0,"embedding":[1.0,2.0]},
            {"index":0,"embedding":[3.0,4.0]}
        ]}"#;
        let port = spawn_mock_server(vec![http_response("200 OK", body)]);

        let result = model(port, 2, 32).embed(&texts(&["a", "b"]));
        match result {
            Err(ModelError::InvalidResponse { message, .. }) => {
                assert!(message.contains("missing vector"), "message: {message}");
            }
            other => panic!("expected InvalidResponse, got {other:?}"),
        }
    }

    #[test]
    fn embed_splits_into_batches() {
        // batch_size 2 over 3 texts: two HTTP round-trips.
        let first = r#"{"data":[
            {"index":0,"embedding":[0.0,0.0]},
            {"index":1,"embedding":[1.0,1.0]}
        ]}"#;
        let second = r#"{"data":[{"index":0,"embedding":[2.0,2.0]}]}"#;
        let port = spawn_mock_server(vec![
            http_response("200 OK", first),
            http_response("200 OK", second),
        ]);

        let vectors = model(port, 2, 2).embed(&texts(&["a", "b", "c"])).unwrap();
        assert_eq!(
            vectors,
            vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 2.0]]
        );
    }

    #[test]
    fn embed_empty_input_makes_no_request() {
        // No canned responses: any request would fail.
        let port = spawn_mock_server(Vec::new());
        let vectors = model(port, 2, 32).embed(&[]).unwrap();
        assert!(vectors.is_empty());
    }

    #[test]
    fn embed_query_returns_single_vector() {
        let body = r#"{"data":[{"index":0,"embedding":[0.25,0.75]}]}"#;
        let port = spawn_mock_server(vec![http_response("200 OK", body)]);

        let vector = model(port, 2, 32).embed_query("question").unwrap();
        assert_eq!(vector, vec![0.25, 0.75]);
    }
}
