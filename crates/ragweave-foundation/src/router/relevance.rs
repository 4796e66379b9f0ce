//! Skipping retrieval for off-topic queries

use crate::prompt::PromptTemplate;
use async_trait::async_trait;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{ChatModel, ContentRetriever, Query, QueryRouter};
use std::sync::Arc;
use tracing::debug;

/// Asks the chat model whether a query is relevant (`{{it}}` is the query
/// text) and routes to nothing when the answer says "no".
pub struct RelevanceGatedQueryRouter {
    chat_model: Arc<dyn ChatModel>,
    prompt: PromptTemplate,
    retrievers: Vec<Arc<dyn ContentRetriever>>,
}

impl RelevanceGatedQueryRouter {
    pub fn new(
        chat_model: Arc<dyn ChatModel>,
        prompt: impl Into<PromptTemplate>,
        retrievers: Vec<Arc<dyn ContentRetriever>>,
    ) -> Self {
        Self {
            chat_model,
            prompt: prompt.into(),
            retrievers,
        }
    }
}

fn says_no(answer: &str) -> bool {
    answer
        .split(|c: char| !c.is_alphabetic())
        .any(|word| word.eq_ignore_ascii_case("no"))
}

#[async_trait]
impl QueryRouter for RelevanceGatedQueryRouter {
    async fn route(&self, query: &Query) -> RagResult<Vec<Arc<dyn ContentRetriever>>> {
        let prompt = self.prompt.render(&[("it", query.text())])?;
        let answer = self
            .chat_model
            .complete(&prompt)
            .await
            .map_err(|e| RagError::Generation(format!("relevance call failed: {e}")))?;

        if says_no(&answer) {
            debug!(query = %query.text(), "query judged irrelevant, skipping retrieval");
            return Ok(Vec::new());
        }
        Ok(self.retrievers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::test_support::{Answer, named, names};

    const PROMPT: &str = "Is the following query related to the business of the car rental company? \
                          Answer only 'yes', 'no' or 'maybe'. Query: {{it}}";

    fn gated(answer: Option<&'static str>) -> RelevanceGatedQueryRouter {
        RelevanceGatedQueryRouter::new(Arc::new(Answer(answer)), PROMPT, vec![named("terms")])
    }

    #[test]
    fn test_says_no() {
        assert!(says_no("No."));
        assert!(says_no("no"));
        assert!(!says_no("yes"));
        assert!(!says_no("Maybe, it is not obvious"));
    }

    #[tokio::test]
    async fn test_no_skips_retrieval() {
        let routed = gated(Some("No")).route(&Query::new("Hi")).await.unwrap();
        assert!(routed.is_empty());
    }

    #[tokio::test]
    async fn test_yes_and_maybe_route() {
        for answer in ["yes", "maybe"] {
            let routed = gated(Some(answer))
                .route(&Query::new("Can I cancel my reservation?"))
                .await
                .unwrap();
            assert_eq!(names(&routed), vec!["terms"]);
        }
    }
}
