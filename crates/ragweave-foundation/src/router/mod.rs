//! Query routers

pub mod language_model;
pub mod relevance;

pub use language_model::{FallbackStrategy, LanguageModelQueryRouter};
pub use relevance::RelevanceGatedQueryRouter;

use async_trait::async_trait;
use ragweave_kernel::error::RagResult;
use ragweave_kernel::rag::{ContentRetriever, Query, QueryRouter};
use std::sync::Arc;

/// Routes every query to the same retrievers.
#[derive(Clone, Default)]
pub struct DefaultQueryRouter {
    retrievers: Vec<Arc<dyn ContentRetriever>>,
}

impl DefaultQueryRouter {
    pub fn new(retrievers: Vec<Arc<dyn ContentRetriever>>) -> Self {
        Self { retrievers }
    }

    pub fn single(retriever: Arc<dyn ContentRetriever>) -> Self {
        Self::new(vec![retriever])
    }

    pub fn retrievers(&self) -> &[Arc<dyn ContentRetriever>] {
        &self.retrievers
    }
}

#[async_trait]
impl QueryRouter for DefaultQueryRouter {
    async fn route(&self, _query: &Query) -> RagResult<Vec<Arc<dyn ContentRetriever>>> {
        Ok(self.retrievers.clone())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use ragweave_kernel::error::{RagError, RagResult};
    use ragweave_kernel::rag::{
        ChatModel, ChatRequest, ChatResponse, ContentRetriever, Query, ScoredContent,
    };
    use std::sync::Arc;

    pub struct Named(pub &'static str);

    #[async_trait]
    impl ContentRetriever for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn retrieve(&self, _query: &Query) -> RagResult<Vec<ScoredContent>> {
            Ok(Vec::new())
        }
    }

    pub fn named(name: &'static str) -> Arc<dyn ContentRetriever> {
        Arc::new(Named(name))
    }

    pub fn names(retrievers: &[Arc<dyn ContentRetriever>]) -> Vec<String> {
        retrievers.iter().map(|r| r.name().to_string()).collect()
    }

    /// Answers every prompt with a fixed reply, or fails when `None`.
    pub struct Answer(pub Option<&'static str>);

    #[async_trait]
    impl ChatModel for Answer {
        fn model_name(&self) -> &str {
            "answer"
        }

        async fn chat(&self, _request: ChatRequest) -> RagResult<ChatResponse> {
            match self.0 {
                Some(text) => Ok(ChatResponse {
                    text: text.to_string(),
                    model: None,
                }),
                None => Err(RagError::Generation("model unavailable".into())),
            }
        }
    }
}
