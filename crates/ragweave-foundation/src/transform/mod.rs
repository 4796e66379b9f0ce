//! Query transformers
//!
//! Every transformer here fails soft: when the chat model cannot produce a
//! rewrite, the original query is returned and the failure is logged.

pub mod compressing;
pub mod expanding;

pub use compressing::CompressingQueryTransformer;
pub use expanding::ExpandingQueryTransformer;

use async_trait::async_trait;
use ragweave_kernel::error::RagResult;
use ragweave_kernel::rag::{ChatMessage, ChatRole, Query, QueryTransformer};

/// Passes the query through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultQueryTransformer;

#[async_trait]
impl QueryTransformer for DefaultQueryTransformer {
    async fn transform(
        &self,
        query: &Query,
        _conversation: &[ChatMessage],
    ) -> RagResult<Vec<Query>> {
        Ok(vec![query.clone()])
    }
}

/// Renders user and assistant turns as `User: ...` / `AI: ...` lines.
pub(crate) fn format_conversation(conversation: &[ChatMessage]) -> String {
    conversation
        .iter()
        .filter_map(|message| match message.role {
            ChatRole::User => Some(format!("User: {}", message.content)),
            ChatRole::Assistant => Some(format!("AI: {}", message.content)),
            ChatRole::System => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_is_identity() {
        let query = Query::new("Can I cancel my reservation?").with_session("42");
        let out = DefaultQueryTransformer
            .transform(&query, &[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(out, vec![query]);
    }

    #[test]
    fn test_conversation_skips_system_turns() {
        let text = format_conversation(&[
            ChatMessage::system("be nice"),
            ChatMessage::user("Tell me about John Doe"),
            ChatMessage::assistant("He was born in 1976."),
        ]);
        assert_eq!(text, "User: Tell me about John Doe\nAI: He was born in 1976.");
    }
}
