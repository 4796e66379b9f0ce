//! Retrieval-augmented generation contracts and types
//!
//! Defines the data model, the metadata filter language, the capability
//! traits of every pipeline stage and collaborator, and the orchestrator
//! that ties the stages together. Concrete implementations live in
//! ragweave-foundation.

pub mod filter;
pub mod models;
pub mod pipeline;
pub mod stages;
pub mod types;
pub mod vector_store;

pub use filter::{Filter, FilterProvider};
pub use models::{
    ChatMessage, ChatModel, ChatRequest, ChatResponse, ChatRole, Embedding, EmbeddingModel,
    ResponseFormat, ScoringModel,
};
pub use pipeline::{DEFAULT_RETRIEVER_TIMEOUT, PipelineStage, RetrievalAugmentor};
pub use stages::{
    ContentAggregator, ContentInjector, ContentRetriever, QueryRouter, QueryTransformer,
    RetrieverDescriptor, SessionContext,
};
pub use types::{
    Document, Metadata, MetadataValue, PipelineResult, Query, ScoredContent, TextSegment,
};
pub use vector_store::{
    DocumentSource, EmbeddingMatch, EmbeddingSearchRequest, EmbeddingStore, SimilarityMetric,
};
