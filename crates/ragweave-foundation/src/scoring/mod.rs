//! Scoring models used by the reranking aggregator

pub mod cohere;
pub mod embedding;

pub use cohere::{CohereConfig, CohereScoringModel, DEFAULT_RERANK_MODEL};
pub use embedding::EmbeddingSimilarityScoringModel;
