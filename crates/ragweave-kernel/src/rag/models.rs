//! Model collaborators consumed by the pipeline
//!
//! Embedding, chat and scoring models are external services. The kernel
//! only names their capabilities; adapters live in the foundation crate.

use crate::error::RagResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A fixed-length embedding vector.
pub type Embedding = Vec<f32>;

/// Text to vector.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Model identifier, e.g. `text-embedding-3-small`.
    fn model_name(&self) -> &str;

    /// Length of every vector this model returns.
    fn dimension(&self) -> usize;

    /// Embed a batch. The output has one vector per input, in input order.
    async fn embed_all(&self, texts: &[String]) -> RagResult<Vec<Embedding>>;

    async fn embed(&self, text: &str) -> RagResult<Embedding> {
        let mut vectors = self.embed_all(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            crate::error::RagError::Embedding(format!(
                "{} returned no vector",
                self.model_name()
            ))
        })
    }
}

// =============================================================================
// Chat
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Requested shape of the model's reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    /// Any JSON object.
    Json,
    /// JSON conforming to the given schema.
    JsonSchema {
        name: String,
        schema: serde_json::Value,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Single user message.
    pub fn user(prompt: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::user(prompt)])
    }

    #[must_use]
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub model: Option<String>,
}

/// A generation model.
///
/// Failures are reported as [`crate::error::RagError::Generation`]; they are
/// fatal for the query being answered.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> RagResult<ChatResponse>;

    /// One-shot prompt, text reply.
    async fn complete(&self, prompt: &str) -> RagResult<String> {
        Ok(self.chat(ChatRequest::user(prompt)).await?.text)
    }
}

// =============================================================================
// Scoring
// =============================================================================

/// A cross-encoder style relevance model.
#[async_trait]
pub trait ScoringModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// One score per candidate, in candidate order. Higher is more relevant.
    async fn score_all(&self, query: &str, candidates: &[String]) -> RagResult<Vec<f64>>;

    async fn score(&self, query: &str, candidate: &str) -> RagResult<f64> {
        let scores = self.score_all(query, &[candidate.to_string()]).await?;
        scores.first().copied().ok_or_else(|| {
            crate::error::RagError::Generation(format!("{} returned no score", self.model_name()))
        })
    }
}
