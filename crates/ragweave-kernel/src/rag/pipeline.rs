//! Retrieval-augmentation orchestration.
//!
//! [`RetrievalAugmentor`] drives one query through the linear state machine
//!
//! ```text
//! Idle -> Transforming -> Routing -> Retrieving -> Aggregating -> Injecting -> Done
//! ```
//!
//! with `Failed` reachable from any non-terminal stage. Transformer
//! failures and per-retriever failures or timeouts are recovered and
//! logged. Router and aggregator failures fail the run. Cancellation is
//! observed up to the end of `Retrieving` and ignored afterwards.

use crate::error::{RagError, RagResult};
use crate::rag::models::ChatMessage;
use crate::rag::stages::{
    ContentAggregator, ContentInjector, ContentRetriever, QueryRouter, QueryTransformer,
    SessionContext,
};
use crate::rag::types::{PipelineResult, Query, ScoredContent};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-retriever timeout applied when none is configured.
pub const DEFAULT_RETRIEVER_TIMEOUT: Duration = Duration::from_secs(30);

/// Stages of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Transforming,
    Routing,
    Retrieving,
    Aggregating,
    Injecting,
    Done,
    Failed,
}

impl PipelineStage {
    /// The stage that follows on success.
    pub fn next(self) -> Option<PipelineStage> {
        match self {
            Self::Idle => Some(Self::Transforming),
            Self::Transforming => Some(Self::Routing),
            Self::Routing => Some(Self::Retrieving),
            Self::Retrieving => Some(Self::Aggregating),
            Self::Aggregating => Some(Self::Injecting),
            Self::Injecting => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether a cancellation request still aborts the run.
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Transforming | Self::Routing | Self::Retrieving
        )
    }
}

/// Enforces the linear stage order of a single run.
#[derive(Debug)]
pub(crate) struct StageTracker {
    stage: PipelineStage,
    visited: Vec<PipelineStage>,
}

impl StageTracker {
    pub(crate) fn new() -> Self {
        Self {
            stage: PipelineStage::Idle,
            visited: vec![PipelineStage::Idle],
        }
    }

    pub(crate) fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub(crate) fn advance(&mut self, to: PipelineStage) -> RagResult<()> {
        let allowed = match to {
            PipelineStage::Failed => !self.stage.is_terminal(),
            _ => self.stage.next() == Some(to),
        };
        if !allowed {
            return Err(RagError::invalid_state_transition(self.stage, to));
        }
        debug!(from = ?self.stage, to = ?to, "pipeline stage");
        self.stage = to;
        self.visited.push(to);
        Ok(())
    }

    pub(crate) fn visited(&self) -> &[PipelineStage] {
        &self.visited
    }
}

/// Slot of one fan-out branch: (transformed query index, retriever index).
type Slot = (usize, usize);

/// The pipeline orchestrator.
#[derive(Clone)]
pub struct RetrievalAugmentor {
    transformer: Arc<dyn QueryTransformer>,
    router: Arc<dyn QueryRouter>,
    aggregator: Arc<dyn ContentAggregator>,
    injector: Arc<dyn ContentInjector>,
    retriever_timeout: Duration,
}

impl RetrievalAugmentor {
    pub fn new(
        transformer: Arc<dyn QueryTransformer>,
        router: Arc<dyn QueryRouter>,
        aggregator: Arc<dyn ContentAggregator>,
        injector: Arc<dyn ContentInjector>,
    ) -> Self {
        Self {
            transformer,
            router,
            aggregator,
            injector,
            retriever_timeout: DEFAULT_RETRIEVER_TIMEOUT,
        }
    }

    pub fn with_retriever_timeout(mut self, timeout: Duration) -> Self {
        self.retriever_timeout = timeout;
        self
    }

    pub fn retriever_timeout(&self) -> Duration {
        self.retriever_timeout
    }

    /// Runs the pipeline for one query.
    pub async fn run(
        &self,
        query: &Query,
        context: Option<&SessionContext>,
    ) -> RagResult<PipelineResult> {
        self.run_cancellable(query, context, &CancellationToken::new())
            .await
    }

    /// Runs the pipeline, aborting in-flight work if `cancel` fires before
    /// aggregation starts.
    pub async fn run_cancellable(
        &self,
        query: &Query,
        context: Option<&SessionContext>,
        cancel: &CancellationToken,
    ) -> RagResult<PipelineResult> {
        let mut tracker = StageTracker::new();
        match self.execute(query, context, cancel, &mut tracker).await {
            Ok(result) => {
                tracker.advance(PipelineStage::Done)?;
                debug!(
                    sources = result.sources.len(),
                    "retrieval augmentation finished"
                );
                Ok(result)
            }
            Err(err) => {
                warn!(stage = ?tracker.stage(), error = %err, "retrieval augmentation failed");
                // Failed is reachable from every non-terminal stage.
                let _ = tracker.advance(PipelineStage::Failed);
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        query: &Query,
        context: Option<&SessionContext>,
        cancel: &CancellationToken,
        tracker: &mut StageTracker,
    ) -> RagResult<PipelineResult> {
        let conversation: &[ChatMessage] = context
            .map(|c| c.conversation.as_slice())
            .unwrap_or(&[]);

        tracker.advance(PipelineStage::Transforming)?;
        let queries = until_cancelled(cancel, self.transform(query, conversation)).await?;

        tracker.advance(PipelineStage::Routing)?;
        let routes = until_cancelled(
            cancel,
            futures::future::try_join_all(queries.iter().map(|q| self.router.route(q))),
        )
        .await??;

        tracker.advance(PipelineStage::Retrieving)?;
        let branch_count: usize = routes.iter().map(Vec::len).sum();
        let results = if branch_count == 0 {
            debug!(query = %query, "no retriever selected, skipping retrieval");
            Vec::new()
        } else {
            self.retrieve(&queries, routes, cancel).await?
        };

        tracker.advance(PipelineStage::Aggregating)?;
        let contents = if results.is_empty() {
            Vec::new()
        } else {
            self.aggregator.aggregate(query, results).await?
        };

        tracker.advance(PipelineStage::Injecting)?;
        let augmented_prompt = if contents.is_empty() {
            query.text().to_string()
        } else {
            self.injector.inject(query, &contents)
        };

        Ok(PipelineResult {
            query: query.clone(),
            augmented_prompt,
            sources: contents,
        })
    }

    async fn transform(&self, query: &Query, conversation: &[ChatMessage]) -> Vec<Query> {
        match self.transformer.transform(query, conversation).await {
            Ok(queries) if !queries.is_empty() => {
                debug!(count = queries.len(), "query transformed");
                queries
            }
            Ok(_) => {
                warn!("query transformer produced no query, using the original");
                vec![query.clone()]
            }
            Err(err) => {
                warn!(error = %err, "query transformation failed, using the original");
                vec![query.clone()]
            }
        }
    }

    /// Fans out every (query, retriever) pair concurrently and waits for all
    /// of them. Results come back in routing order.
    async fn retrieve(
        &self,
        queries: &[Query],
        routes: Vec<Vec<Arc<dyn ContentRetriever>>>,
        cancel: &CancellationToken,
    ) -> RagResult<Vec<Vec<ScoredContent>>> {
        let timeout = self.retriever_timeout;
        let mut tasks = JoinSet::new();

        for (qi, (query, retrievers)) in queries.iter().zip(routes).enumerate() {
            for (ri, retriever) in retrievers.into_iter().enumerate() {
                let query = query.clone();
                tasks.spawn(async move {
                    let outcome = tokio::time::timeout(timeout, retriever.retrieve(&query)).await;
                    ((qi, ri), retriever.name().to_string(), outcome)
                });
            }
        }

        let mut collected: Vec<(Slot, Vec<ScoredContent>)> = Vec::with_capacity(tasks.len());
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(RagError::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((slot, name, Ok(Ok(contents)))) => {
                    debug!(retriever = %name, count = contents.len(), "retrieved");
                    collected.push((slot, contents));
                }
                Ok((slot, name, Ok(Err(err)))) => {
                    warn!(retriever = %name, error = %err, "retriever failed, using no results");
                    collected.push((slot, Vec::new()));
                }
                Ok((slot, name, Err(_))) => {
                    warn!(
                        retriever = %name,
                        timeout_ms = timeout.as_millis() as u64,
                        "retriever timed out, using no results"
                    );
                    collected.push((slot, Vec::new()));
                }
                Err(err) => {
                    warn!(error = %err, "retriever task did not complete, using no results");
                }
            }
        }

        collected.sort_by_key(|(slot, _)| *slot);
        Ok(collected.into_iter().map(|(_, contents)| contents).collect())
    }
}

async fn until_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> RagResult<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RagError::Cancelled),
        output = future => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Identity;

    #[async_trait]
    impl QueryTransformer for Identity {
        async fn transform(&self, query: &Query, _: &[ChatMessage]) -> RagResult<Vec<Query>> {
            Ok(vec![query.clone()])
        }
    }

    struct Broken;

    #[async_trait]
    impl QueryTransformer for Broken {
        async fn transform(&self, _: &Query, _: &[ChatMessage]) -> RagResult<Vec<Query>> {
            Err(RagError::Transform("model unavailable".into()))
        }
    }

    struct Fixed {
        name: &'static str,
        contents: Vec<ScoredContent>,
        delay: Duration,
    }

    impl Fixed {
        fn new(name: &'static str, texts: &[(&str, f64)]) -> Arc<dyn ContentRetriever> {
            Arc::new(Self {
                name,
                contents: texts
                    .iter()
                    .map(|(text, score)| ScoredContent::new(*text, *score))
                    .collect(),
                delay: Duration::ZERO,
            })
        }

        fn slow(name: &'static str, delay: Duration) -> Arc<dyn ContentRetriever> {
            Arc::new(Self {
                name,
                contents: vec![ScoredContent::new("late", 1.0)],
                delay,
            })
        }
    }

    #[async_trait]
    impl ContentRetriever for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn retrieve(&self, _: &Query) -> RagResult<Vec<ScoredContent>> {
            tokio::time::sleep(self.delay).await;
            Ok(self.contents.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl ContentRetriever for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn retrieve(&self, _: &Query) -> RagResult<Vec<ScoredContent>> {
            Err(RagError::retrieval("failing", "index unreachable"))
        }
    }

    /// Sets its flag when dropped before finishing.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    struct Hanging(Arc<AtomicBool>);

    #[async_trait]
    impl ContentRetriever for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn retrieve(&self, _: &Query) -> RagResult<Vec<ScoredContent>> {
            let guard = DropFlag(self.0.clone());
            tokio::time::sleep(Duration::from_secs(60)).await;
            std::mem::forget(guard);
            Ok(Vec::new())
        }
    }

    struct Static(Vec<Arc<dyn ContentRetriever>>);

    #[async_trait]
    impl QueryRouter for Static {
        async fn route(&self, _: &Query) -> RagResult<Vec<Arc<dyn ContentRetriever>>> {
            Ok(self.0.clone())
        }
    }

    struct RejectingRouter;

    #[async_trait]
    impl QueryRouter for RejectingRouter {
        async fn route(&self, _: &Query) -> RagResult<Vec<Arc<dyn ContentRetriever>>> {
            Err(RagError::Generation("router model down".into()))
        }
    }

    struct Concat;

    #[async_trait]
    impl ContentAggregator for Concat {
        async fn aggregate(
            &self,
            _: &Query,
            results: Vec<Vec<ScoredContent>>,
        ) -> RagResult<Vec<ScoredContent>> {
            Ok(results.into_iter().flatten().collect())
        }
    }

    /// Cancels the run's token from inside aggregation.
    struct CancellingAggregator(CancellationToken);

    #[async_trait]
    impl ContentAggregator for CancellingAggregator {
        async fn aggregate(
            &self,
            _: &Query,
            results: Vec<Vec<ScoredContent>>,
        ) -> RagResult<Vec<ScoredContent>> {
            self.0.cancel();
            Ok(results.into_iter().flatten().collect())
        }
    }

    struct Lines;

    impl ContentInjector for Lines {
        fn inject(&self, query: &Query, contents: &[ScoredContent]) -> String {
            let block: Vec<&str> = contents.iter().map(|c| c.text.as_str()).collect();
            format!("{}\n\n{}", query.text(), block.join("\n"))
        }
    }

    fn augmentor(
        transformer: Arc<dyn QueryTransformer>,
        retrievers: Vec<Arc<dyn ContentRetriever>>,
    ) -> RetrievalAugmentor {
        RetrievalAugmentor::new(
            transformer,
            Arc::new(Static(retrievers)),
            Arc::new(Concat),
            Arc::new(Lines),
        )
    }

    #[tokio::test]
    async fn test_zero_retrievers_leaves_prompt_unchanged() {
        let query = Query::new("What is the capital of France?");
        let result = augmentor(Arc::new(Identity), Vec::new())
            .run(&query, None)
            .await
            .unwrap();

        assert_eq!(result.augmented_prompt, query.text());
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_results_keep_routing_order() {
        let slow: Arc<dyn ContentRetriever> = Arc::new(Fixed {
            name: "slow",
            contents: vec![ScoredContent::new("first", 0.2)],
            delay: Duration::from_millis(30),
        });
        let fast = Fixed::new("fast", &[("second", 0.9)]);

        let result = augmentor(Arc::new(Identity), vec![slow, fast])
            .run(&Query::new("q"), None)
            .await
            .unwrap();

        let texts: Vec<&str> = result.sources.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(result.augmented_prompt, "q\n\nfirst\nsecond");
    }

    #[tokio::test]
    async fn test_failing_and_timed_out_retrievers_yield_empty_lists() {
        let augmentor = augmentor(
            Arc::new(Identity),
            vec![
                Arc::new(Failing),
                Fixed::slow("slow", Duration::from_secs(5)),
                Fixed::new("healthy", &[("kept", 0.7)]),
            ],
        )
        .with_retriever_timeout(Duration::from_millis(50));

        let result = augmentor.run(&Query::new("q"), None).await.unwrap();
        assert_eq!(result.sources, vec![ScoredContent::new("kept", 0.7)]);
    }

    #[tokio::test]
    async fn test_transformer_failure_falls_back_to_original_query() {
        let result = augmentor(Arc::new(Broken), vec![Fixed::new("docs", &[("a", 0.5)])])
            .run(&Query::new("original"), None)
            .await
            .unwrap();

        assert_eq!(result.query.text(), "original");
        assert_eq!(result.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_router_failure_fails_the_run() {
        let augmentor = RetrievalAugmentor::new(
            Arc::new(Identity),
            Arc::new(RejectingRouter),
            Arc::new(Concat),
            Arc::new(Lines),
        );

        let err = augmentor.run(&Query::new("q"), None).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_retrievers() {
        let dropped = Arc::new(AtomicBool::new(false));
        let augmentor = augmentor(
            Arc::new(Identity),
            vec![Arc::new(Hanging(dropped.clone()))],
        );
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        let err = augmentor
            .run_cancellable(&Query::new("q"), None, &cancel)
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, RagError::Cancelled));
        // abort is delivered at the task's next poll
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancellation_after_aggregation_is_ignored() {
        let cancel = CancellationToken::new();
        let augmentor = RetrievalAugmentor::new(
            Arc::new(Identity),
            Arc::new(Static(vec![Fixed::new("docs", &[("a", 0.5)])])),
            Arc::new(CancellingAggregator(cancel.clone())),
            Arc::new(Lines),
        );

        let result = augmentor
            .run_cancellable(&Query::new("q"), None, &cancel)
            .await
            .unwrap();
        assert!(cancel.is_cancelled());
        assert_eq!(result.sources.len(), 1);
    }

    #[test]
    fn test_stage_tracker_enforces_linear_order() {
        let mut tracker = StageTracker::new();
        tracker.advance(PipelineStage::Transforming).unwrap();
        assert!(tracker.advance(PipelineStage::Retrieving).is_err());
        tracker.advance(PipelineStage::Routing).unwrap();
        tracker.advance(PipelineStage::Failed).unwrap();
        assert!(tracker.advance(PipelineStage::Failed).is_err());
        assert_eq!(
            tracker.visited(),
            &[
                PipelineStage::Idle,
                PipelineStage::Transforming,
                PipelineStage::Routing,
                PipelineStage::Failed
            ]
        );
    }

    #[test]
    fn test_cancellable_stages() {
        assert!(PipelineStage::Retrieving.is_cancellable());
        assert!(!PipelineStage::Aggregating.is_cancellable());
        assert!(!PipelineStage::Done.is_cancellable());
    }
}
