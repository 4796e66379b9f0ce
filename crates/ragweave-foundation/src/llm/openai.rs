//! OpenAI model adapters
//!
//! 使用 `async-openai` crate 实现 OpenAI 聊天与向量接口
//! Chat and embedding models backed by the `async-openai` crate
//!
//! # 支持的服务
//! # Supported Services
//!
//! - OpenAI API (api.openai.com)
//! - 兼容 OpenAI API 的服务 (vLLM, LocalAI, text-embeddings-inference 等)
//! - OpenAI-compatible services (vLLM, LocalAI, text-embeddings-inference, etc.)
//!
//! # 示例
//! # Examples
//!
//! ```rust,ignore
//! use ragweave_foundation::llm::{OpenAiChatModel, OpenAiConfig, OpenAiEmbeddingModel};
//!
//! let chat = OpenAiChatModel::new(OpenAiConfig::new(api_key).with_model("gpt-4.1"))?;
//! let answer = chat.complete("Can I cancel my reservation?").await?;
//!
//! // 兼容服务上的 all-MiniLM-L6-v2
//! // all-MiniLM-L6-v2 served by a compatible endpoint
//! let embeddings = OpenAiEmbeddingModel::new(
//!     OpenAiConfig::new("unused").with_base_url("http://localhost:8080/v1"),
//!     "all-MiniLM-L6-v2",
//!     384,
//! )?;
//! ```

use async_openai::{
    Client,
    config::OpenAIConfig as AsyncOpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs,
        ResponseFormat as OpenAIResponseFormat, ResponseFormatJsonSchema,
    },
};
use async_trait::async_trait;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{
    ChatMessage, ChatModel, ChatRequest, ChatResponse, ChatRole, Embedding, EmbeddingModel,
    ResponseFormat,
};
use std::time::Duration;
use tracing::debug;

/// 默认聊天模型
/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4.1";

/// OpenAI 适配器配置
/// OpenAI adapter configuration
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API Key
    pub api_key: String,
    /// API 基础 URL
    /// API Base URL
    pub base_url: Option<String>,
    /// 默认模型
    /// Default Model
    pub model: String,
    /// 默认温度
    /// Default Temperature
    pub temperature: Option<f32>,
    /// 请求超时（秒）
    /// Request Timeout (seconds)
    pub timeout_secs: u64,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: None,
            timeout_secs: 60,
        }
    }
}

impl OpenAiConfig {
    /// 创建新配置
    /// Create new configuration
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// 设置 base URL
    /// Set base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// 设置默认模型
    /// Set default model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// 设置默认温度
    /// Set default temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// 设置超时
    /// Set timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn client(&self) -> RagResult<Client<AsyncOpenAIConfig>> {
        if self.api_key.trim().is_empty() && self.base_url.is_none() {
            return Err(RagError::Configuration("OpenAI API key is empty".into()));
        }

        let mut openai_config = AsyncOpenAIConfig::new().with_api_key(&self.api_key);
        if let Some(ref base_url) = self.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| RagError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Client::with_config(openai_config).with_http_client(http))
    }
}

/// 将 async-openai 错误映射为给定的错误种类
/// Map an async-openai error into the caller's error kind
fn convert_error(err: OpenAIError, kind: fn(String) -> RagError) -> RagError {
    match err {
        OpenAIError::ApiError(api_err) => kind(match api_err.code {
            Some(code) => format!("{code}: {}", api_err.message),
            None => api_err.message,
        }),
        OpenAIError::Reqwest(e) if e.is_timeout() => kind(format!("request timed out: {e}")),
        OpenAIError::InvalidArgument(msg) => RagError::Configuration(msg),
        other => kind(other.to_string()),
    }
}

// ============================================================================
// Chat
// ============================================================================

/// OpenAI 聊天模型
/// OpenAI chat model
pub struct OpenAiChatModel {
    client: Client<AsyncOpenAIConfig>,
    config: OpenAiConfig,
}

impl OpenAiChatModel {
    /// 使用配置创建模型
    /// Create the model from configuration
    pub fn new(config: OpenAiConfig) -> RagResult<Self> {
        let client = config.client()?;
        Ok(Self { client, config })
    }

    fn convert_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
        let content = message.content.clone();
        Ok(match message.role {
            ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(content)
                .build()?
                .into(),
        })
    }

    fn convert_format(format: &ResponseFormat) -> OpenAIResponseFormat {
        match format {
            ResponseFormat::Text => OpenAIResponseFormat::Text,
            ResponseFormat::Json => OpenAIResponseFormat::JsonObject,
            ResponseFormat::JsonSchema { name, schema } => OpenAIResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: name.clone(),
                    schema: Some(schema.clone()),
                    strict: Some(true),
                },
            },
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, request: ChatRequest) -> RagResult<ChatResponse> {
        let to_generation = |e: OpenAIError| convert_error(e, RagError::Generation);

        let messages = request
            .messages
            .iter()
            .map(Self::convert_message)
            .collect::<Result<Vec<_>, _>>()
            .map_err(to_generation)?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&self.config.model).messages(messages);

        // 请求温度优先于默认温度
        // Request temperature overrides the configured default
        if let Some(temperature) = request.temperature.or(self.config.temperature) {
            builder.temperature(temperature);
        }
        if request.response_format != ResponseFormat::Text {
            builder.response_format(Self::convert_format(&request.response_format));
        }

        let openai_request = builder.build().map_err(to_generation)?;
        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(to_generation)?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RagError::Generation("response contained no message".into()))?;

        debug!(model = %response.model, chars = text.len(), "chat completion");
        Ok(ChatResponse {
            text,
            model: Some(response.model),
        })
    }
}

// ============================================================================
// Embeddings
// ============================================================================

/// OpenAI 向量模型
/// OpenAI embedding model
pub struct OpenAiEmbeddingModel {
    client: Client<AsyncOpenAIConfig>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingModel {
    pub fn new(
        config: OpenAiConfig,
        model: impl Into<String>,
        dimension: usize,
    ) -> RagResult<Self> {
        Ok(Self {
            client: config.client()?,
            model: model.into(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbeddingModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_all(&self, texts: &[String]) -> RagResult<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let to_embedding = |e: OpenAIError| convert_error(e, RagError::Embedding);

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .build()
            .map_err(to_embedding)?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(to_embedding)?;

        // 按输入顺序排列
        // Restore input order
        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        let vectors: Vec<Embedding> = data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::Embedding(format!(
                "{} returned a {}-dimensional vector, expected {}",
                self.model,
                bad.len(),
                self.dimension
            )));
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_key_without_base_url_rejected() {
        let err = OpenAiChatModel::new(OpenAiConfig::new("  ")).err().unwrap();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn test_compatible_endpoint_needs_no_key() {
        let model = OpenAiEmbeddingModel::new(
            OpenAiConfig::new("").with_base_url("http://localhost:8080/v1"),
            "all-MiniLM-L6-v2",
            384,
        )
        .unwrap();
        assert_eq!(model.dimension(), 384);
    }

    #[test]
    fn test_json_schema_format_conversion() {
        let format = ResponseFormat::JsonSchema {
            name: "Person".into(),
            schema: json!({"type": "object"}),
        };
        match OpenAiChatModel::convert_format(&format) {
            OpenAIResponseFormat::JsonSchema { json_schema } => {
                assert_eq!(json_schema.name, "Person");
                assert_eq!(json_schema.strict, Some(true));
            }
            _ => panic!("expected json schema format"),
        }
    }

    #[test]
    fn test_config_debug_hides_key() {
        let config = OpenAiConfig::new("sk-secret").with_temperature(0.4);
        assert!(!format!("{config:?}").contains("sk-secret"));
    }
}
