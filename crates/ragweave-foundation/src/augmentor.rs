//! Assembling a [`RetrievalAugmentor`] from optional parts

use crate::aggregator::DefaultContentAggregator;
use crate::injector::DefaultContentInjector;
use crate::router::DefaultQueryRouter;
use crate::transform::DefaultQueryTransformer;
use ragweave_kernel::rag::{
    ContentAggregator, ContentInjector, ContentRetriever, QueryRouter, QueryTransformer,
    RetrievalAugmentor,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder whose unset stages fall back to the identity transformer, a
/// router with no retrievers, the deduplicating aggregator and the default
/// injector.
#[derive(Default)]
pub struct RetrievalAugmentorBuilder {
    transformer: Option<Arc<dyn QueryTransformer>>,
    router: Option<Arc<dyn QueryRouter>>,
    aggregator: Option<Arc<dyn ContentAggregator>>,
    injector: Option<Arc<dyn ContentInjector>>,
    retriever_timeout: Option<Duration>,
}

impl RetrievalAugmentorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query_transformer(mut self, transformer: Arc<dyn QueryTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn query_router(mut self, router: Arc<dyn QueryRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Routes every query to this one retriever.
    pub fn content_retriever(self, retriever: Arc<dyn ContentRetriever>) -> Self {
        self.query_router(Arc::new(DefaultQueryRouter::single(retriever)))
    }

    pub fn content_aggregator(mut self, aggregator: Arc<dyn ContentAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn content_injector(mut self, injector: Arc<dyn ContentInjector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn retriever_timeout(mut self, timeout: Duration) -> Self {
        self.retriever_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> RetrievalAugmentor {
        let augmentor = RetrievalAugmentor::new(
            self.transformer
                .unwrap_or_else(|| Arc::new(DefaultQueryTransformer)),
            self.router
                .unwrap_or_else(|| Arc::new(DefaultQueryRouter::default())),
            self.aggregator
                .unwrap_or_else(|| Arc::new(DefaultContentAggregator)),
            self.injector
                .unwrap_or_else(|| Arc::new(DefaultContentInjector::default())),
        );
        match self.retriever_timeout {
            Some(timeout) => augmentor.with_retriever_timeout(timeout),
            None => augmentor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragweave_kernel::rag::{DEFAULT_RETRIEVER_TIMEOUT, Query};

    #[tokio::test]
    async fn test_defaults_pass_query_through() {
        let augmentor = RetrievalAugmentorBuilder::new().build();
        assert_eq!(augmentor.retriever_timeout(), DEFAULT_RETRIEVER_TIMEOUT);

        let result = augmentor.run(&Query::new("Hello"), None).await.unwrap();
        assert_eq!(result.augmented_prompt, "Hello");
        assert!(result.sources.is_empty());
    }

    #[test]
    fn test_timeout_override() {
        let augmentor = RetrievalAugmentorBuilder::new()
            .retriever_timeout(Duration::from_millis(250))
            .build();
        assert_eq!(augmentor.retriever_timeout(), Duration::from_millis(250));
    }
}
