//! Pluggable stage contracts of the retrieval-augmentation pipeline
//!
//! A query flows through the stages strictly left to right:
//!
//! ```text
//! transform -> route -> retrieve (fan-out) -> aggregate -> inject
//! ```
//!
//! Each stage is one capability trait with several concrete variants in
//! ragweave-foundation. [`crate::rag::RetrievalAugmentor`] ties them together.

use crate::error::RagResult;
use crate::rag::models::ChatMessage;
use crate::rag::types::{Query, ScoredContent};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Rewrites an incoming query into one or more queries.
///
/// Transformers fail soft: when a rewrite cannot be produced they return
/// the original query rather than an error.
#[async_trait]
pub trait QueryTransformer: Send + Sync {
    async fn transform(&self, query: &Query, conversation: &[ChatMessage]) -> RagResult<Vec<Query>>;
}

/// A source of relevant content for a query.
#[async_trait]
pub trait ContentRetriever: Send + Sync {
    /// Name used in logs and in retrieval errors.
    fn name(&self) -> &str;

    /// Returns content ordered by descending score.
    async fn retrieve(&self, query: &Query) -> RagResult<Vec<ScoredContent>>;
}

/// Selects the retrievers that apply to a query.
///
/// An empty selection is valid and means retrieval is skipped.
#[async_trait]
pub trait QueryRouter: Send + Sync {
    async fn route(&self, query: &Query) -> RagResult<Vec<Arc<dyn ContentRetriever>>>;
}

/// Merges the per-retriever result lists into one ordered list.
#[async_trait]
pub trait ContentAggregator: Send + Sync {
    async fn aggregate(
        &self,
        query: &Query,
        results: Vec<Vec<ScoredContent>>,
    ) -> RagResult<Vec<ScoredContent>>;
}

/// Formats retained content into the prompt sent to the chat model.
///
/// With no content the query text must come back unaltered.
pub trait ContentInjector: Send + Sync {
    fn inject(&self, query: &Query, contents: &[ScoredContent]) -> String;
}

/// A retriever paired with the natural-language description a
/// language-model router uses to decide whether it applies.
#[derive(Clone)]
pub struct RetrieverDescriptor {
    pub retriever: Arc<dyn ContentRetriever>,
    pub description: String,
}

impl RetrieverDescriptor {
    pub fn new(retriever: Arc<dyn ContentRetriever>, description: impl Into<String>) -> Self {
        Self {
            retriever,
            description: description.into(),
        }
    }
}

impl fmt::Debug for RetrieverDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrieverDescriptor")
            .field("retriever", &self.retriever.name())
            .field("description", &self.description)
            .finish()
    }
}

/// Conversation state visible to one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    /// Recent turns, oldest first.
    pub conversation: Vec<ChatMessage>,
}

impl SessionContext {
    pub fn new(conversation: Vec<ChatMessage>) -> Self {
        Self { conversation }
    }
}
