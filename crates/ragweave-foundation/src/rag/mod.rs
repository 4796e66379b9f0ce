//! Document handling and embedding stores
//!
//! Loading, splitting and ingesting documents, plus concrete
//! implementations of the kernel [`EmbeddingStore`] trait.

pub mod ingestor;
pub mod loaders;
#[cfg(feature = "mongodb")]
pub mod mongo_source;
pub mod pinecone_store;
#[cfg(feature = "qdrant")]
pub mod qdrant_store;
pub mod similarity;
pub mod source;
pub mod splitter;
pub mod vector_store;

pub use ingestor::{EmbeddingStoreIngestor, IngestionSummary};
pub use loaders::{DirectoryDocumentSource, LoaderError, TextDocumentLoader};
#[cfg(feature = "mongodb")]
pub use mongo_source::{MongoDbConfig, MongoDbDocumentSource};
pub use pinecone_store::{PineconeConfig, PineconeEmbeddingStore};
#[cfg(feature = "qdrant")]
pub use qdrant_store::{QdrantConfig, QdrantEmbeddingStore};
pub use similarity::relevance_score;
pub use source::JsonLinesDocumentSource;
pub use splitter::RecursiveDocumentSplitter;
pub use vector_store::InMemoryEmbeddingStore;

// Re-export kernel types for convenience
pub use ragweave_kernel::rag::{
    Document, DocumentSource, EmbeddingMatch, EmbeddingSearchRequest, EmbeddingStore,
    SimilarityMetric, TextSegment,
};
