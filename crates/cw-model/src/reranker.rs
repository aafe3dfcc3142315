//! Remote rerank client.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RerankerConfig;
use crate::error::{ModelError, ModelResult};
use crate::http::{default_client, send_with_retry};
use crate::{RerankResult, RerankerModel};

/// Rerank client backed by a `/rerank` endpoint.
///
/// Sends `{model, query, documents, top_n, return_documents: false}` and
/// reads back `results: [{index, relevance_score}]`.
#[derive(Debug)]
pub struct RemoteRerankerModel {
    config: RerankerConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
    return_documents: bool,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

#[derive(Debug, Deserialize)]
struct RerankItem {
    index: usize,
    relevance_score: f32,
}

impl RemoteRerankerModel {
    /// Create a new rerank client.
    pub fn new(config: RerankerConfig) -> Self {
        Self {
            config,
            client: default_client(),
        }
    }
}

impl RerankerModel for RemoteRerankerModel {
    fn rerank(&self, query: &str, documents: &[String]) -> ModelResult<Vec<RerankResult>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Reranking {} documents", documents.len());

        let url = format!("{}/rerank", self.config.base_url);
        let body = RerankRequest {
            model: &self.config.model_id,
            query,
            documents,
            top_n: self.config.top_n.min(documents.len()),
            return_documents: false,
        };

        let response = send_with_retry("rerank", || {
            let mut request = self.client.post(&url).json(&body);
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }
            request.send()
        })?;

        let parsed: RerankResponse = response
            .json()
            .map_err(|e| ModelError::invalid_response("rerank", e.to_string()))?;

        // An index past the submitted documents is a service bug; drop it.
        let mut results = Vec::with_capacity(parsed.results.len());
        for item in parsed.results {
            if item.index >= documents.len() {
                warn!("rerank returned out-of-range index {}", item.index);
                continue;
            }
            results.push(RerankResult {
                index: item.index,
                relevance_score: item.relevance_score,
            });
        }
        Ok(results)
    }

    fn top_n(&self) -> usize {
        self.config.top_n
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

    fn model(port: u16) -> RemoteRerankerModel {
        RemoteRerankerModel::new(RerankerConfig {
            base_url: format!("http://127.0.0.1:{port}/v1"),
            api_key: None,
            model_id: "test-rerank".to_string(),
            top_n: 10,
        })
    }

    fn documents(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rerank_parses_scored_results() {
        let body = r#"{"results":[
            {"index":1,"relevance_score":0.9},
            {"index":0,"relevance_score":0.4}
        ]}"#;
        let port = spawn_mock_server(vec![http_response("200 OK", body)]);

        let results = model(port).rerank("query", &documents(&["a", "b"])).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].index, 1);
        assert!((results[0].relevance_score - 0.9).abs() < f32::EPSILON);
        assert_eq!(results[1].index, 0);
    }

    #[test]
    fn rerank_drops_out_of_range_indices() {
        let body = r#"{"results":[
            {"index":7,"relevance_score":0.95},
            {"index":0,"relevance_score":0.4}
        ]}"#;
        let port = spawn_mock_server(vec![http_response("200 OK", body)]);

        let results = model(port).rerank("query", &documents(&["a", "b"])).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 0);
    }

    #[test]
    fn rerank_empty_documents_makes_no_request() {
        // No canned responses: any request would fail.
        let port = spawn_mock_server(Vec::new());
        let results = model(port).rerank("query", &[]).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn rerank_unparseable_body_is_invalid_response() {
        let port = spawn_mock_server(vec![http_response("200 OK", "not json")]);

        let result = model(port).rerank("query", &documents(&["a"]));
        assert!(
            matches!(result, Err(ModelError::InvalidResponse { .. })),
            "got {result:?}"
        );
    }
}
