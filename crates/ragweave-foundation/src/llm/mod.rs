//! Language model adapters

pub mod openai;

pub use openai::{DEFAULT_CHAT_MODEL, OpenAiChatModel, OpenAiConfig, OpenAiEmbeddingModel};
