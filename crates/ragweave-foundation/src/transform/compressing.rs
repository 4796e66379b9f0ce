//! Conversation-aware query compression

use super::format_conversation;
use crate::prompt::PromptTemplate;
use async_trait::async_trait;
use ragweave_kernel::error::RagResult;
use ragweave_kernel::rag::{ChatMessage, ChatModel, Query, QueryTransformer};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_COMPRESSION_PROMPT: &str = "\
Read and understand the conversation between the User and the AI. \
Then, analyze the new query from the User. \
Identify all relevant details, terms, and context from both the conversation and the new query. \
Reformulate this query into a clear, concise, and self-contained format suitable for information retrieval.

Conversation:
{{chatMemory}}

User query: {{query}}

It is very important that you provide only reformulated query and nothing else! \
Do not prepend a query with anything!";

/// Folds the recent conversation and a follow-up question into one
/// standalone query, so that "Where was he born?" becomes
/// "Where was John Doe born?".
pub struct CompressingQueryTransformer {
    chat_model: Arc<dyn ChatModel>,
    prompt: PromptTemplate,
}

impl CompressingQueryTransformer {
    pub fn new(chat_model: Arc<dyn ChatModel>) -> Self {
        Self {
            chat_model,
            prompt: PromptTemplate::new(DEFAULT_COMPRESSION_PROMPT),
        }
    }

    /// Template variables: `{{chatMemory}}` and `{{query}}`.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<PromptTemplate>) -> Self {
        self.prompt = prompt.into();
        self
    }

    async fn compress(&self, query: &Query, conversation: &[ChatMessage]) -> RagResult<String> {
        let history = format_conversation(conversation);
        let prompt = self
            .prompt
            .render(&[("chatMemory", &history), ("query", query.text())])?;
        self.chat_model.complete(&prompt).await
    }
}

#[async_trait]
impl QueryTransformer for CompressingQueryTransformer {
    async fn transform(
        &self,
        query: &Query,
        conversation: &[ChatMessage],
    ) -> RagResult<Vec<Query>> {
        if format_conversation(conversation).is_empty() {
            return Ok(vec![query.clone()]);
        }

        match self.compress(query, conversation).await {
            Ok(text) if !text.trim().is_empty() => {
                let compressed = text.trim();
                debug!(original = %query.text(), compressed = %compressed, "query compressed");
                Ok(vec![query.with_text(compressed)])
            }
            Ok(_) => {
                warn!("query compression returned nothing, keeping the original query");
                Ok(vec![query.clone()])
            }
            Err(err) => {
                warn!(error = %err, "query compression failed, keeping the original query");
                Ok(vec![query.clone()])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragweave_kernel::error::RagError;
    use ragweave_kernel::rag::{ChatRequest, ChatResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: RagResult<String>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(reply: RagResult<String>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: ChatRequest) -> RagResult<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(request.messages[0].content.contains("User query: Where was he born?"));
            match &self.reply {
                Ok(text) => Ok(ChatResponse {
                    text: text.clone(),
                    model: None,
                }),
                Err(err) => Err(RagError::Generation(err.to_string())),
            }
        }
    }

    fn history() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("Tell me about John Doe"),
            ChatMessage::assistant("John Doe is a fictional person."),
        ]
    }

    #[tokio::test]
    async fn test_compresses_follow_up() {
        let model = Scripted::new(Ok("  Where was John Doe born?\n".into()));
        let transformer = CompressingQueryTransformer::new(model.clone());
        let query = Query::new("Where was he born?").with_session("s1");

        let out = transformer.transform(&query, &history()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text(), "Where was John Doe born?");
        assert_eq!(out[0].session_id(), Some("s1"));
    }

    #[tokio::test]
    async fn test_no_conversation_skips_model() {
        let model = Scripted::new(Ok("unused".into()));
        let transformer = CompressingQueryTransformer::new(model.clone());
        let query = Query::new("Where was he born?");

        let out = transformer.transform(&query, &[]).await.unwrap();
        assert_eq!(out, vec![query]);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_failure_keeps_original() {
        let model = Scripted::new(Err(RagError::Generation("boom".into())));
        let transformer = CompressingQueryTransformer::new(model);
        let query = Query::new("Where was he born?");

        let out = transformer.transform(&query, &history()).await.unwrap();
        assert_eq!(out, vec![query]);
    }
}
