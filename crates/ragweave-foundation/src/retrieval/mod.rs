//! Content retrievers

pub mod embedding_store;
pub mod web_search;

pub use embedding_store::{
    DEFAULT_MAX_RESULTS, DEFAULT_MIN_SCORE, EmbeddingStoreContentRetriever, RetrievalFilter,
};
pub use web_search::{
    TavilyConfig, TavilyWebSearchEngine, WebSearchContentRetriever, WebSearchEngine,
    WebSearchResult,
};
