//! 检索增强助手
//! Retrieval-augmented assistant
//!
//! One turn: read the session window, augment the user message, ask the
//! chat model, record the turn.

use crate::memory::ChatMemoryStore;
use ragweave_kernel::error::RagResult;
use ragweave_kernel::rag::{
    ChatMessage, ChatModel, ChatRequest, PipelineResult, Query, RetrievalAugmentor,
    ScoredContent, SessionContext,
};
use std::sync::Arc;
use tracing::{debug, info};

/// 未指定会话时使用的会话 ID
/// Session id used when the query carries none
pub const DEFAULT_SESSION_ID: &str = "default";

/// 助手回答
/// An answer with the content it was grounded on
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantAnswer {
    pub text: String,
    pub augmented_prompt: String,
    pub sources: Vec<ScoredContent>,
}

pub struct Assistant {
    chat_model: Arc<dyn ChatModel>,
    augmentor: Option<RetrievalAugmentor>,
    memory: Option<Arc<ChatMemoryStore>>,
    system_message: Option<String>,
}

impl Assistant {
    /// 创建不带检索和记忆的助手
    /// Plain chat, no retrieval and no memory
    pub fn new(chat_model: Arc<dyn ChatModel>) -> Self {
        Self {
            chat_model,
            augmentor: None,
            memory: None,
            system_message: None,
        }
    }

    #[must_use]
    pub fn with_augmentor(mut self, augmentor: RetrievalAugmentor) -> Self {
        self.augmentor = Some(augmentor);
        self
    }

    #[must_use]
    pub fn with_memory(mut self, memory: Arc<ChatMemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    #[must_use]
    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    /// 在默认会话中提问
    /// Ask in the default session
    pub async fn chat(&self, message: &str) -> RagResult<AssistantAnswer> {
        self.answer(&Query::new(message)).await
    }

    /// 回答一轮对话
    /// Answer one turn.
    ///
    /// The session's memory stays locked for the whole turn. Memory records
    /// the user's own message, not the augmented prompt.
    pub async fn answer(&self, query: &Query) -> RagResult<AssistantAnswer> {
        let session_id = query.session_id().unwrap_or(DEFAULT_SESSION_ID);
        let mut guard = match &self.memory {
            Some(store) => Some(store.lock(session_id).await),
            None => None,
        };
        let conversation = guard
            .as_ref()
            .map(|memory| memory.conversation())
            .unwrap_or_default();

        let augmented = match &self.augmentor {
            Some(augmentor) => {
                let context = SessionContext::new(conversation.clone());
                augmentor.run(query, Some(&context)).await?
            }
            None => PipelineResult::passthrough(query.clone()),
        };

        let mut messages = Vec::with_capacity(conversation.len() + 2);
        if let Some(system) = &self.system_message {
            messages.push(ChatMessage::system(system));
        }
        messages.extend(conversation);
        messages.push(ChatMessage::user(&augmented.augmented_prompt));

        debug!(
            session = %session_id,
            messages = messages.len(),
            sources = augmented.sources.len(),
            "asking the chat model"
        );
        let response = self.chat_model.chat(ChatRequest::new(messages)).await?;
        info!(question = %query.text(), answer = %response.text, "answered");

        if let Some(memory) = guard.as_mut() {
            if let Some(system) = &self.system_message {
                memory.add(ChatMessage::system(system));
            }
            memory.add(ChatMessage::user(query.text()));
            memory.add(ChatMessage::assistant(&response.text));
        }

        Ok(AssistantAnswer {
            text: response.text,
            augmented_prompt: augmented.augmented_prompt,
            sources: augmented.sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augmentor::RetrievalAugmentorBuilder;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use ragweave_kernel::error::RagError;
    use ragweave_kernel::rag::{ChatResponse, ContentRetriever};

    /// Records every request and answers with the number of messages seen.
    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatModel for Recorder {
        fn model_name(&self) -> &str {
            "recorder"
        }

        async fn chat(&self, request: ChatRequest) -> RagResult<ChatResponse> {
            let text = format!("seen {}", request.messages.len());
            self.requests.lock().push(request);
            Ok(ChatResponse { text, model: None })
        }
    }

    struct Terms;

    #[async_trait]
    impl ContentRetriever for Terms {
        fn name(&self) -> &str {
            "terms"
        }

        async fn retrieve(&self, _query: &Query) -> RagResult<Vec<ScoredContent>> {
            Ok(vec![ScoredContent::new("Cancellation is free up to 7 days before.", 0.9)])
        }
    }

    #[tokio::test]
    async fn test_turn_uses_augmented_prompt_and_remembers_original() {
        let model = Arc::new(Recorder::default());
        let memory = Arc::new(ChatMemoryStore::new(10));
        let assistant = Assistant::new(model.clone())
            .with_system_message("You are a car rental agent.")
            .with_memory(memory.clone())
            .with_augmentor(
                RetrievalAugmentorBuilder::new()
                    .content_retriever(Arc::new(Terms))
                    .build(),
            );

        let answer = assistant.chat("Can I cancel my reservation?").await.unwrap();
        assert_eq!(answer.sources.len(), 1);
        assert!(answer.augmented_prompt.contains("Cancellation is free"));

        let sent = model.requests.lock()[0].messages.clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].content.contains("Answer using the following information"));

        let remembered = memory.messages(DEFAULT_SESSION_ID).await;
        assert_eq!(remembered.len(), 3);
        assert_eq!(remembered[1], ChatMessage::user("Can I cancel my reservation?"));

        let second = assistant.chat("And after that?").await.unwrap();
        assert_eq!(second.text, "seen 4");
    }

    struct Failing;

    #[async_trait]
    impl ChatModel for Failing {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn chat(&self, _request: ChatRequest) -> RagResult<ChatResponse> {
            Err(RagError::Generation("quota exceeded".into()))
        }
    }

    #[tokio::test]
    async fn test_generation_failure_leaves_memory_untouched() {
        let memory = Arc::new(ChatMemoryStore::new(10));
        let assistant = Assistant::new(Arc::new(Failing)).with_memory(memory.clone());

        let err = assistant
            .answer(&Query::new("Hi").with_session("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
        assert!(memory.messages("u1").await.is_empty());
    }
}
