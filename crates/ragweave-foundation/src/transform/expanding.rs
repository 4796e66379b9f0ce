//! Multi-query expansion

use crate::prompt::PromptTemplate;
use async_trait::async_trait;
use ragweave_kernel::error::RagResult;
use ragweave_kernel::rag::{ChatMessage, ChatModel, Query, QueryTransformer};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_EXPANSION_COUNT: usize = 3;

pub const DEFAULT_EXPANSION_PROMPT: &str = "\
Generate {{n}} different versions of a provided user query. \
Each version should be worded differently, using synonyms or alternative sentence structures, \
but they should all retain the original meaning. \
These versions will be used to retrieve relevant documents. \
It is very important to provide each query version on a separate line, \
without enumerations, hyphens, or any additional formatting!
User query: {{query}}";

/// Asks the chat model for several rewordings of the query. Each variant
/// is routed and retrieved on its own.
pub struct ExpandingQueryTransformer {
    chat_model: Arc<dyn ChatModel>,
    prompt: PromptTemplate,
    count: usize,
}

impl ExpandingQueryTransformer {
    pub fn new(chat_model: Arc<dyn ChatModel>) -> Self {
        Self {
            chat_model,
            prompt: PromptTemplate::new(DEFAULT_EXPANSION_PROMPT),
            count: DEFAULT_EXPANSION_COUNT,
        }
    }

    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }

    /// Template variables: `{{n}}` and `{{query}}`.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<PromptTemplate>) -> Self {
        self.prompt = prompt.into();
        self
    }
}

/// One variant per non-blank line, duplicates dropped.
fn parse_variants(reply: &str, limit: usize) -> Vec<String> {
    let mut variants: Vec<String> = Vec::new();
    for line in reply.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !variants.iter().any(|v| v == line) {
            variants.push(line.to_string());
        }
        if variants.len() == limit {
            break;
        }
    }
    variants
}

#[async_trait]
impl QueryTransformer for ExpandingQueryTransformer {
    async fn transform(
        &self,
        query: &Query,
        _conversation: &[ChatMessage],
    ) -> RagResult<Vec<Query>> {
        let count = self.count.to_string();
        let prompt = self.prompt.render(&[("n", &count), ("query", query.text())])?;

        let reply = match self.chat_model.complete(&prompt).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "query expansion failed, keeping the original query");
                return Ok(vec![query.clone()]);
            }
        };

        let variants = parse_variants(&reply, self.count);
        if variants.is_empty() {
            warn!("query expansion returned nothing, keeping the original query");
            return Ok(vec![query.clone()]);
        }
        debug!(variants = variants.len(), "query expanded");
        Ok(variants.into_iter().map(|text| query.with_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragweave_kernel::rag::{ChatRequest, ChatResponse};

    struct Reply(&'static str);

    #[async_trait]
    impl ChatModel for Reply {
        fn model_name(&self) -> &str {
            "reply"
        }

        async fn chat(&self, request: ChatRequest) -> RagResult<ChatResponse> {
            assert!(request.messages[0].content.starts_with("Generate 2 different"));
            Ok(ChatResponse {
                text: self.0.to_string(),
                model: None,
            })
        }
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!(
            parse_variants("a\n\n  b \na\nc\nd", 3),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[tokio::test]
    async fn test_expands_into_variants_keeping_session() {
        let transformer = ExpandingQueryTransformer::new(Arc::new(Reply(
            "How do I cancel a booking?\nIs reservation cancellation possible?\n",
        )))
        .with_count(2);
        let query = Query::new("Can I cancel my reservation?").with_session("u1");

        let out = transformer.transform(&query, &[]).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].text(), "Is reservation cancellation possible?");
        assert!(out.iter().all(|q| q.session_id() == Some("u1")));
    }

    #[tokio::test]
    async fn test_blank_reply_keeps_original() {
        let transformer = ExpandingQueryTransformer::new(Arc::new(Reply("  \n"))).with_count(2);
        let query = Query::new("Can I cancel my reservation?");
        assert_eq!(transformer.transform(&query, &[]).await.unwrap(), vec![query]);
    }
}
