//! Retriever over an embedding store
//!
//! Embeds the query text, searches the store and returns the matches as
//! scored content. The metadata filter applied to the search is either
//! absent, fixed at construction, or computed per query by a
//! [`FilterProvider`].

use async_trait::async_trait;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{
    ContentRetriever, EmbeddingModel, EmbeddingSearchRequest, EmbeddingStore, Filter,
    FilterProvider, Query, ScoredContent,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_RESULTS: usize = 3;
pub const DEFAULT_MIN_SCORE: f64 = 0.0;

/// How the search filter is chosen.
#[derive(Clone, Default)]
pub enum RetrievalFilter {
    #[default]
    None,
    Static(Filter),
    /// Evaluated per query. A [`RagError::FilterGeneration`] from the
    /// provider is logged and the search runs unfiltered.
    Dynamic(Arc<dyn FilterProvider>),
}

impl std::fmt::Debug for RetrievalFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Static(filter) => write!(f, "Static({filter})"),
            Self::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

pub struct EmbeddingStoreContentRetriever {
    name: String,
    store: Arc<dyn EmbeddingStore>,
    embedding_model: Arc<dyn EmbeddingModel>,
    max_results: usize,
    min_score: f64,
    filter: RetrievalFilter,
}

impl EmbeddingStoreContentRetriever {
    pub fn new(store: Arc<dyn EmbeddingStore>, embedding_model: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            name: "embedding-store".to_string(),
            store,
            embedding_model,
            max_results: DEFAULT_MAX_RESULTS,
            min_score: DEFAULT_MIN_SCORE,
            filter: RetrievalFilter::None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = RetrievalFilter::Static(filter);
        self
    }

    #[must_use]
    pub fn with_dynamic_filter(mut self, provider: Arc<dyn FilterProvider>) -> Self {
        self.filter = RetrievalFilter::Dynamic(provider);
        self
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    async fn resolve_filter(&self, query: &Query) -> RagResult<Option<Filter>> {
        match &self.filter {
            RetrievalFilter::None => Ok(None),
            RetrievalFilter::Static(filter) => Ok(Some(filter.clone())),
            RetrievalFilter::Dynamic(provider) => match provider.filter_for(query).await {
                Ok(filter) => Ok(filter),
                Err(RagError::FilterGeneration(reason)) => {
                    warn!(
                        retriever = %self.name,
                        reason = %reason,
                        "filter generation failed, searching without a filter"
                    );
                    Ok(None)
                }
                Err(other) => Err(other),
            },
        }
    }
}

#[async_trait]
impl ContentRetriever for EmbeddingStoreContentRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve(&self, query: &Query) -> RagResult<Vec<ScoredContent>> {
        if self.max_results == 0 {
            return Ok(Vec::new());
        }

        let filter = self.resolve_filter(query).await?;
        let embedding = self
            .embedding_model
            .embed(query.text())
            .await
            .map_err(|e| RagError::retrieval(&self.name, e.to_string()))?;

        if let Some(filter) = &filter {
            debug!(retriever = %self.name, filter = %filter, "filtered search");
        }
        let request = EmbeddingSearchRequest::new(embedding, self.max_results)
            .with_min_score(self.min_score)
            .with_filter(filter);
        let matches = self
            .store
            .search(&request)
            .await
            .map_err(|e| RagError::retrieval(&self.name, e.to_string()))?;

        // Stores already apply the threshold; this keeps the guarantee for
        // stores that round scores differently.
        Ok(matches
            .into_iter()
            .filter(|m| m.score >= self.min_score)
            .take(self.max_results)
            .map(|m| ScoredContent::from_segment(m.segment, m.score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingModel;
    use crate::rag::InMemoryEmbeddingStore;
    use ragweave_kernel::rag::{EmbeddingModel, TextSegment};

    async fn store_with(
        model: &HashingEmbeddingModel,
        segments: Vec<TextSegment>,
    ) -> Arc<InMemoryEmbeddingStore> {
        let store = Arc::new(InMemoryEmbeddingStore::new());
        for segment in segments {
            let embedding = model.embed(&segment.text).await.unwrap();
            store.add(embedding, segment).await.unwrap();
        }
        store
    }

    fn animals() -> Vec<TextSegment> {
        vec![
            TextSegment::new("This is an article about dogs.").with_metadata("animal", "dog"),
            TextSegment::new("This is an article about birds.").with_metadata("animal", "bird"),
        ]
    }

    #[tokio::test]
    async fn test_static_filter() {
        let model = HashingEmbeddingModel::new(128);
        let store = store_with(&model, animals()).await;
        let retriever = EmbeddingStoreContentRetriever::new(store, Arc::new(model))
            .with_filter(Filter::eq("animal", "dog"));

        let found = retriever.retrieve(&Query::new("Which animal?")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata.get_str("animal"), Some("dog"));
    }

    #[tokio::test]
    async fn test_dynamic_filter_uses_query_metadata() {
        let model = HashingEmbeddingModel::new(128);
        let store = store_with(
            &model,
            vec![
                TextSegment::new("My favorite color is green").with_metadata("userId", "1"),
                TextSegment::new("My favorite color is red").with_metadata("userId", "2"),
            ],
        )
        .await;
        let provider = |query: &Query| query.session_id().map(|id| Filter::eq("userId", id));
        let retriever = EmbeddingStoreContentRetriever::new(store, Arc::new(model))
            .with_dynamic_filter(Arc::new(provider));

        let found = retriever
            .retrieve(&Query::new("Which color would be best for a suit?").with_session("2"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "My favorite color is red");
    }

    struct BrokenProvider;

    #[async_trait]
    impl FilterProvider for BrokenProvider {
        async fn filter_for(&self, _query: &Query) -> RagResult<Option<Filter>> {
            Err(RagError::FilterGeneration("unparseable: SELECT ???".into()))
        }
    }

    #[tokio::test]
    async fn test_filter_generation_failure_falls_back_to_unfiltered() {
        let model = HashingEmbeddingModel::new(128);
        let store = store_with(&model, animals()).await;
        let retriever = EmbeddingStoreContentRetriever::new(store, Arc::new(model))
            .with_max_results(5)
            .with_dynamic_filter(Arc::new(BrokenProvider));

        let found = retriever.retrieve(&Query::new("article")).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_min_score_and_max_results_respected() {
        let model = HashingEmbeddingModel::new(128);
        let store = store_with(&model, animals()).await;
        let retriever = EmbeddingStoreContentRetriever::new(store, Arc::new(model))
            .with_max_results(1)
            .with_min_score(0.6);

        let found = retriever
            .retrieve(&Query::new("This is an article about birds."))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.iter().all(|c| c.score >= 0.6));
        assert_eq!(found[0].metadata.get_str("animal"), Some("bird"));
    }
}
