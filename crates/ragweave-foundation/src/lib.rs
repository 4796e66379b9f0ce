//! ragweave foundation
//!
//! Concrete pipeline stages, model and store adapters, ingestion, memory
//! and the assistant built on the ragweave-kernel contracts.

// shared REST plumbing
mod http;

// prompt module
pub mod prompt;

// llm module - OpenAI chat and embeddings
pub mod llm;

// embedding model registry
pub mod embedding;

// scoring models for reranking
pub mod scoring;

// RAG module - embedding stores, loading, splitting and ingestion
pub mod rag;

// metadata filter providers
pub mod filter;

// pipeline stages
pub mod aggregator;
pub mod injector;
pub mod retrieval;
pub mod router;
pub mod transform;

pub mod augmentor;

// conversation memory
pub mod memory;

// assistant façade
pub mod assistant;

// structured output extraction
pub mod structured;

pub use aggregator::{
    DefaultContentAggregator, ReRankingContentAggregator, ReciprocalRankFusionAggregator,
};
pub use assistant::{Assistant, AssistantAnswer, DEFAULT_SESSION_ID};
pub use augmentor::RetrievalAugmentorBuilder;
pub use embedding::{HashingEmbeddingModel, create_embedding_model};
pub use filter::{LanguageModelSqlFilterBuilder, TableDefinition};
pub use http::DEFAULT_HTTP_TIMEOUT_SECS;
pub use injector::DefaultContentInjector;
pub use memory::{ChatMemoryStore, MessageWindowChatMemory};
pub use prompt::PromptTemplate;
pub use retrieval::{EmbeddingStoreContentRetriever, WebSearchContentRetriever};
pub use router::{DefaultQueryRouter, LanguageModelQueryRouter, RelevanceGatedQueryRouter};
pub use structured::{JsonObjectSchema, StructuredOutputExtractor};
pub use transform::{
    CompressingQueryTransformer, DefaultQueryTransformer, ExpandingQueryTransformer,
};
