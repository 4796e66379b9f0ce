//! Web search retrieval
//!
//! [`WebSearchContentRetriever`] turns the organic results of a
//! [`WebSearchEngine`] into scored content. [`TavilyWebSearchEngine`] is the
//! bundled engine.

use crate::http::{self, DEFAULT_HTTP_TIMEOUT_SECS};
use async_trait::async_trait;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{ContentRetriever, Query, ScoredContent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const TAVILY_BASE_URL: &str = "https://api.tavily.com";
pub const DEFAULT_WEB_RESULTS: usize = 3;

pub const TITLE_KEY: &str = "title";
pub const URL_KEY: &str = "url";

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[async_trait]
pub trait WebSearchEngine: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> RagResult<Vec<WebSearchResult>>;
}

#[derive(Clone)]
pub struct TavilyConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl TavilyConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: TAVILY_BASE_URL.to_string(),
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
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

impl std::fmt::Debug for TavilyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyConfig")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<WebSearchResult>,
}

pub struct TavilyWebSearchEngine {
    client: reqwest::Client,
    config: TavilyConfig,
}

impl TavilyWebSearchEngine {
    pub fn new(config: TavilyConfig) -> RagResult<Self> {
        http::require_key("Tavily", &config.api_key)?;
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            config,
        })
    }
}

#[async_trait]
impl WebSearchEngine for TavilyWebSearchEngine {
    async fn search(&self, query: &str, max_results: usize) -> RagResult<Vec<WebSearchResult>> {
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&TavilyRequest {
                api_key: &self.config.api_key,
                query,
                max_results,
            })
            .send()
            .await
            .map_err(|e| http::map_error(e, RagError::Internal))?;
        let parsed: TavilyResponse = http::read_json(resp, RagError::Internal).await?;
        debug!(results = parsed.results.len(), "web search finished");
        Ok(parsed.results)
    }
}

pub struct WebSearchContentRetriever {
    engine: Arc<dyn WebSearchEngine>,
    max_results: usize,
}

impl WebSearchContentRetriever {
    pub fn new(engine: Arc<dyn WebSearchEngine>) -> Self {
        Self {
            engine,
            max_results: DEFAULT_WEB_RESULTS,
        }
    }

    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// Engines that do not score results get a rank-based score in (0, 1].
fn to_content(rank: usize, result: WebSearchResult) -> ScoredContent {
    let score = result.score.unwrap_or(1.0 / (rank as f64 + 1.0));
    let text = if result.content.trim().is_empty() {
        result.title.clone()
    } else {
        result.content
    };
    ScoredContent::new(text, score)
        .with_metadata(TITLE_KEY, result.title)
        .with_metadata(URL_KEY, result.url)
}

#[async_trait]
impl ContentRetriever for WebSearchContentRetriever {
    fn name(&self) -> &str {
        "web-search"
    }

    async fn retrieve(&self, query: &Query) -> RagResult<Vec<ScoredContent>> {
        if self.max_results == 0 {
            return Ok(Vec::new());
        }
        let results = self
            .engine
            .search(query.text(), self.max_results)
            .await
            .map_err(|e| RagError::retrieval(self.name(), e.to_string()))?;

        let mut contents: Vec<ScoredContent> = results
            .into_iter()
            .take(self.max_results)
            .enumerate()
            .map(|(rank, result)| to_content(rank, result))
            .collect();
        contents.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(contents)
    }
}
