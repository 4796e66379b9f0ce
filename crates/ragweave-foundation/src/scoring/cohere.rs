//! Cohere rerank adapter
//!
//! `POST {base}/v2/rerank` with `{model, query, documents}`. The response
//! lists `{index, relevance_score}` pairs ordered by relevance; scores are
//! mapped back to input order here.

use crate::http::{self, DEFAULT_HTTP_TIMEOUT_SECS};
use async_trait::async_trait;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::ScoringModel;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const COHERE_BASE_URL: &str = "https://api.cohere.com";
pub const DEFAULT_RERANK_MODEL: &str = "rerank-english-v3.0";

#[derive(Clone)]
pub struct CohereConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl CohereConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_RERANK_MODEL.to_string(),
            base_url: COHERE_BASE_URL.to_string(),
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl std::fmt::Debug for CohereConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CohereConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

/// Map ranked results back onto input positions.
fn scores_in_input_order(results: Vec<RerankResult>, count: usize) -> RagResult<Vec<f64>> {
    let mut scores = vec![None; count];
    for result in results {
        let slot = scores.get_mut(result.index).ok_or_else(|| {
            RagError::Generation(format!(
                "rerank result index {} out of range for {count} documents",
                result.index
            ))
        })?;
        *slot = Some(result.relevance_score);
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            s.ok_or_else(|| {
                RagError::Generation(format!("rerank returned no score for document {i}"))
            })
        })
        .collect()
}

pub struct CohereScoringModel {
    client: reqwest::Client,
    config: CohereConfig,
}

impl CohereScoringModel {
    pub fn new(config: CohereConfig) -> RagResult<Self> {
        http::require_key("Cohere", &config.api_key)?;
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            config,
        })
    }
}

#[async_trait]
impl ScoringModel for CohereScoringModel {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn score_all(&self, query: &str, candidates: &[String]) -> RagResult<Vec<f64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v2/rerank", self.config.base_url.trim_end_matches('/'));
        let body = RerankRequest {
            model: &self.config.model,
            query,
            documents: candidates,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::map_error(e, RagError::Generation))?;
        let parsed: RerankResponse = http::read_json(resp, RagError::Generation).await?;

        debug!(model = %self.config.model, documents = candidates.len(), "reranked");
        scores_in_input_order(parsed.results, candidates.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores_follow_input_order() {
        let parsed: RerankResponse = serde_json::from_str(
            r#"{"id":"x","results":[{"index":2,"relevance_score":0.9},{"index":0,"relevance_score":0.4},{"index":1,"relevance_score":0.1}]}"#,
        )
        .unwrap();
        assert_eq!(
            scores_in_input_order(parsed.results, 3).unwrap(),
            vec![0.4, 0.1, 0.9]
        );
    }

    #[test]
    fn test_missing_or_foreign_index_rejected() {
        let results = vec![RerankResult {
            index: 0,
            relevance_score: 0.5,
        }];
        assert!(scores_in_input_order(results, 2).is_err());

        let results = vec![RerankResult {
            index: 3,
            relevance_score: 0.5,
        }];
        assert!(scores_in_input_order(results, 1).is_err());
    }

    #[test]
    fn test_empty_key_rejected_before_network() {
        let err = CohereScoringModel::new(CohereConfig::new("")).err().unwrap();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_no_candidates_no_request() {
        let model = CohereScoringModel::new(
            CohereConfig::new("key").with_base_url("http://127.0.0.1:9"),
        )
        .unwrap();
        assert!(model.score_all("q", &[]).await.unwrap().is_empty());
    }
}
