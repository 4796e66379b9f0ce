//! In-memory embedding store implementation
//!
//! A brute-force store backed by a vector of entries. Filters are evaluated
//! locally. Suitable for development, tests and small collections.

use crate::rag::similarity::relevance_score;
use async_trait::async_trait;
use parking_lot::RwLock;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{
    Embedding, EmbeddingMatch, EmbeddingSearchRequest, EmbeddingStore, SimilarityMetric,
    TextSegment,
};
use tracing::debug;
use uuid::Uuid;

struct Entry {
    id: String,
    embedding: Embedding,
    segment: TextSegment,
}

/// In-memory embedding store using brute-force similarity search.
///
/// # Example
///
/// ```rust,ignore
/// use ragweave_foundation::rag::InMemoryEmbeddingStore;
/// use ragweave_kernel::rag::{EmbeddingSearchRequest, EmbeddingStore, Filter, TextSegment};
///
/// let store = InMemoryEmbeddingStore::new();
/// store.add(embedding, TextSegment::new("This is an article about dogs.").with_metadata("animal", "dog")).await?;
///
/// let request = EmbeddingSearchRequest::new(query_embedding, 3)
///     .with_filter(Some(Filter::eq("animal", "dog")));
/// let matches = store.search(&request).await?;
/// ```
pub struct InMemoryEmbeddingStore {
    entries: RwLock<Vec<Entry>>,
    metric: SimilarityMetric,
}

impl InMemoryEmbeddingStore {
    /// Create an empty store using cosine relevance.
    pub fn new() -> Self {
        Self::with_metric(SimilarityMetric::Cosine)
    }

    pub fn with_metric(metric: SimilarityMetric) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            metric,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn similarity_metric(&self) -> SimilarityMetric {
        self.metric
    }
}

impl Default for InMemoryEmbeddingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryEmbeddingStore {
    async fn add(&self, embedding: Embedding, segment: TextSegment) -> RagResult<String> {
        let mut entries = self.entries.write();
        if let Some(first) = entries.first() {
            if first.embedding.len() != embedding.len() {
                return Err(RagError::Store(format!(
                    "embedding dimension {} does not match store dimension {}",
                    embedding.len(),
                    first.embedding.len()
                )));
            }
        }

        let id = Uuid::new_v4().to_string();
        entries.push(Entry {
            id: id.clone(),
            embedding,
            segment,
        });
        Ok(id)
    }

    async fn search(&self, request: &EmbeddingSearchRequest) -> RagResult<Vec<EmbeddingMatch>> {
        let entries = self.entries.read();
        if let Some(first) = entries.first() {
            if first.embedding.len() != request.query_embedding.len() {
                return Err(RagError::Store(format!(
                    "query embedding dimension {} does not match store dimension {}",
                    request.query_embedding.len(),
                    first.embedding.len()
                )));
            }
        }

        let mut matches: Vec<EmbeddingMatch> = entries
            .iter()
            .filter(|entry| {
                request
                    .filter
                    .as_ref()
                    .is_none_or(|filter| filter.matches(&entry.segment.metadata))
            })
            .map(|entry| EmbeddingMatch {
                id: entry.id.clone(),
                score: relevance_score(&entry.embedding, &request.query_embedding, self.metric),
                segment: entry.segment.clone(),
            })
            .filter(|found| found.score >= request.min_score)
            .collect();

        // Stable sort keeps insertion order among equal scores.
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(request.max_results);

        debug!(
            candidates = entries.len(),
            returned = matches.len(),
            "in-memory search"
        );
        Ok(matches)
    }

    async fn remove_all(&self) -> RagResult<()> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragweave_kernel::rag::Filter;

    async fn animals() -> InMemoryEmbeddingStore {
        let store = InMemoryEmbeddingStore::new();
        store
            .add(
                vec![1.0, 0.0, 0.0],
                TextSegment::new("This is an article about dogs.").with_metadata("animal", "dog"),
            )
            .await
            .unwrap();
        store
            .add(
                vec![0.9, 0.1, 0.0],
                TextSegment::new("This is an article about birds.").with_metadata("animal", "bird"),
            )
            .await
            .unwrap();
        store
            .add(vec![0.0, 0.0, 1.0], TextSegment::new("Untagged note."))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_orders_by_descending_score() {
        let store = animals().await;
        let matches = store
            .search(&EmbeddingSearchRequest::new(vec![1.0, 0.0, 0.0], 10))
            .await
            .unwrap();

        assert_eq!(matches.len(), 3);
        assert!(matches.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(matches[0].segment.text, "This is an article about dogs.");
    }

    #[tokio::test]
    async fn test_static_filter_keeps_only_dog() {
        let store = animals().await;
        let request = EmbeddingSearchRequest::new(vec![0.9, 0.1, 0.0], 10)
            .with_filter(Some(Filter::eq("animal", "dog")));

        let matches = store.search(&request).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].segment.metadata.get_str("animal"), Some("dog"));
    }

    #[tokio::test]
    async fn test_min_score_and_max_results() {
        let store = animals().await;
        let request = EmbeddingSearchRequest::new(vec![1.0, 0.0, 0.0], 1).with_min_score(0.6);
        let matches = store.search(&request).await.unwrap();
        assert_eq!(matches.len(), 1);

        let request = EmbeddingSearchRequest::new(vec![1.0, 0.0, 0.0], 10).with_min_score(0.9);
        let matches = store.search(&request).await.unwrap();
        assert!(matches.iter().all(|m| m.score >= 0.9));
        assert_eq!(matches.len(), 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = animals().await;
        let err = store
            .add(vec![1.0, 0.0], TextSegment::new("short"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Store(_)));
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch_rejected() {
        let store = animals().await;
        let err = store
            .search(&EmbeddingSearchRequest::new(vec![1.0, 0.0], 10))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Store(_)));

        let empty = InMemoryEmbeddingStore::new();
        let matches = empty
            .search(&EmbeddingSearchRequest::new(vec![1.0, 0.0], 10))
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_remove_all() {
        let store = animals().await;
        assert_eq!(store.len(), 3);
        store.remove_all().await.unwrap();
        assert!(store.is_empty());
    }
}
