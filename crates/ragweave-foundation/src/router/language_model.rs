//! Routing by asking a chat model which sources apply

use crate::prompt::PromptTemplate;
use async_trait::async_trait;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{ChatModel, ContentRetriever, Query, QueryRouter, RetrieverDescriptor};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_ROUTING_PROMPT: &str = "\
Based on the user query, determine the most suitable data source(s) \
to retrieve relevant information from the following options:
{{options}}
It is very important that your answer consists of either a single number \
or multiple numbers separated by commas and nothing else!
User query: {{query}}";

/// What to do when the model's answer names no valid source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Skip retrieval for this query.
    #[default]
    DoNotRoute,
    RouteToAll,
    /// Surface the answer as a generation error.
    Fail,
}

pub struct LanguageModelQueryRouter {
    chat_model: Arc<dyn ChatModel>,
    descriptors: Vec<RetrieverDescriptor>,
    prompt: PromptTemplate,
    fallback: FallbackStrategy,
}

impl LanguageModelQueryRouter {
    pub fn new(chat_model: Arc<dyn ChatModel>, descriptors: Vec<RetrieverDescriptor>) -> Self {
        Self {
            chat_model,
            descriptors,
            prompt: PromptTemplate::new(DEFAULT_ROUTING_PROMPT),
            fallback: FallbackStrategy::default(),
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Template variables: `{{options}}` and `{{query}}`.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<PromptTemplate>) -> Self {
        self.prompt = prompt.into();
        self
    }

    fn options(&self) -> String {
        let mut out = String::new();
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            let _ = writeln!(out, "{}: {}", i + 1, descriptor.description);
        }
        out.trim_end().to_string()
    }

    fn fall_back(&self, answer: &str) -> RagResult<Vec<Arc<dyn ContentRetriever>>> {
        match self.fallback {
            FallbackStrategy::DoNotRoute => {
                warn!(answer = %answer, "unparseable routing answer, skipping retrieval");
                Ok(Vec::new())
            }
            FallbackStrategy::RouteToAll => {
                warn!(answer = %answer, "unparseable routing answer, routing to all retrievers");
                Ok(self.descriptors.iter().map(|d| d.retriever.clone()).collect())
            }
            FallbackStrategy::Fail => Err(RagError::Generation(format!(
                "unparseable routing answer: {answer}"
            ))),
        }
    }
}

/// 1-based choices separated by commas. `None` when any piece is not a
/// valid option number.
fn parse_choices(answer: &str, options: usize) -> Option<Vec<usize>> {
    let mut picked = Vec::new();
    for piece in answer.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let number: usize = piece.trim_end_matches('.').parse().ok()?;
        if number == 0 || number > options {
            return None;
        }
        if !picked.contains(&(number - 1)) {
            picked.push(number - 1);
        }
    }
    if picked.is_empty() { None } else { Some(picked) }
}

#[async_trait]
impl QueryRouter for LanguageModelQueryRouter {
    async fn route(&self, query: &Query) -> RagResult<Vec<Arc<dyn ContentRetriever>>> {
        if self.descriptors.is_empty() {
            return Ok(Vec::new());
        }

        let options = self.options();
        let prompt = self
            .prompt
            .render(&[("options", &options), ("query", query.text())])?;
        let answer = self
            .chat_model
            .complete(&prompt)
            .await
            .map_err(|e| RagError::Generation(format!("routing call failed: {e}")))?;

        match parse_choices(&answer, self.descriptors.len()) {
            Some(choices) => {
                debug!(answer = %answer.trim(), "routed");
                Ok(choices
                    .into_iter()
                    .map(|i| self.descriptors[i].retriever.clone())
                    .collect())
            }
            None => self.fall_back(answer.trim()),
        }
    }
}
