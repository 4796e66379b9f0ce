//! EmbeddingStore trait definition
//!
//! Defines the abstract interface for vector storage and similarity search.
//! Concrete implementations (in-memory, Pinecone, Qdrant) live in
//! ragweave-foundation.

use crate::error::RagResult;
use crate::rag::filter::Filter;
use crate::rag::models::Embedding;
use crate::rag::types::{Document, TextSegment};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Similarity metric used by a store to compare embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Cosine similarity, reported as a relevance score in [0, 1].
    #[default]
    Cosine,
    /// Euclidean distance, reported as `1 / (1 + distance)`.
    Euclidean,
    DotProduct,
}

/// Parameters of one similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSearchRequest {
    pub query_embedding: Embedding,
    pub max_results: usize,
    /// Matches scoring below this are dropped by the store.
    pub min_score: f64,
    pub filter: Option<Filter>,
}

impl EmbeddingSearchRequest {
    pub fn new(query_embedding: Embedding, max_results: usize) -> Self {
        Self {
            query_embedding,
            max_results,
            min_score: 0.0,
            filter: None,
        }
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }
}

/// A stored segment returned by a search.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatch {
    pub id: String,
    pub score: f64,
    pub segment: TextSegment,
}

/// Abstract interface for vector storage and similarity search.
///
/// Stores take `&self`: several retrievers may search the same store
/// concurrently, so implementations handle their own synchronization.
///
/// # Example
///
/// ```rust,ignore
/// use ragweave_kernel::rag::{EmbeddingSearchRequest, EmbeddingStore, TextSegment};
///
/// let segment = TextSegment::new("This is an article about dogs.").with_metadata("animal", "dog");
/// store.add(embedding, segment).await?;
///
/// let request = EmbeddingSearchRequest::new(query_embedding, 5).with_min_score(0.5);
/// for found in store.search(&request).await? {
///     println!("{}: {}", found.score, found.segment.text);
/// }
/// ```
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Stores one segment with its embedding and returns the generated id.
    async fn add(&self, embedding: Embedding, segment: TextSegment) -> RagResult<String>;

    /// Stores segments pairwise with their embeddings.
    async fn add_all(
        &self,
        embeddings: Vec<Embedding>,
        segments: Vec<TextSegment>,
    ) -> RagResult<Vec<String>> {
        if embeddings.len() != segments.len() {
            return Err(crate::error::RagError::InvalidInput(format!(
                "{} embeddings for {} segments",
                embeddings.len(),
                segments.len()
            )));
        }
        let mut ids = Vec::with_capacity(segments.len());
        for (embedding, segment) in embeddings.into_iter().zip(segments) {
            ids.push(self.add(embedding, segment).await?);
        }
        Ok(ids)
    }

    /// Returns at most `max_results` matches, highest score first, none of
    /// them below `min_score`, all of them satisfying the filter.
    async fn search(&self, request: &EmbeddingSearchRequest) -> RagResult<Vec<EmbeddingMatch>>;

    /// Removes every stored segment.
    async fn remove_all(&self) -> RagResult<()>;
}

/// Supplies raw documents for ingestion.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    async fn fetch(&self) -> RagResult<Vec<Document>>;
}
