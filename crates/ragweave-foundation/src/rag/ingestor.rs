//! Embedding store ingestion
//!
//! Documents -> (optional split) -> embed in batches -> store.

use crate::rag::splitter::RecursiveDocumentSplitter;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{Document, DocumentSource, EmbeddingModel, EmbeddingStore, TextSegment};
use std::sync::Arc;
use tracing::{debug, info};

/// Inputs sent to the embedding model per request.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub documents: usize,
    pub segments: usize,
    pub ids: Vec<String>,
}

/// Embeds documents and writes them to an [`EmbeddingStore`].
///
/// Without a splitter every document is stored as a single segment.
#[derive(Clone)]
pub struct EmbeddingStoreIngestor {
    embedding_model: Arc<dyn EmbeddingModel>,
    store: Arc<dyn EmbeddingStore>,
    splitter: Option<RecursiveDocumentSplitter>,
    batch_size: usize,
}

impl EmbeddingStoreIngestor {
    pub fn new(embedding_model: Arc<dyn EmbeddingModel>, store: Arc<dyn EmbeddingStore>) -> Self {
        Self {
            embedding_model,
            store,
            splitter: None,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_splitter(mut self, splitter: RecursiveDocumentSplitter) -> Self {
        self.splitter = Some(splitter);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn ingest(&self, documents: &[Document]) -> RagResult<IngestionSummary> {
        let segments: Vec<TextSegment> = match &self.splitter {
            Some(splitter) => splitter.split_all(documents),
            None => documents.iter().map(Document::to_segment).collect(),
        };
        let ids = self.ingest_segments(segments).await?;
        Ok(IngestionSummary {
            documents: documents.len(),
            segments: ids.len(),
            ids,
        })
    }

    /// Fetches everything from `source` and ingests it.
    pub async fn ingest_source(&self, source: &dyn DocumentSource) -> RagResult<IngestionSummary> {
        let documents = source.fetch().await?;
        debug!(source = source.name(), count = documents.len(), "fetched documents");
        self.ingest(&documents).await
    }

    pub async fn ingest_segments(&self, segments: Vec<TextSegment>) -> RagResult<Vec<String>> {
        let mut ids = Vec::with_capacity(segments.len());
        let mut remaining = segments.into_iter().peekable();

        while remaining.peek().is_some() {
            let batch: Vec<TextSegment> = remaining.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
            let embeddings = self.embedding_model.embed_all(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "{} returned {} vectors for {} inputs",
                    self.embedding_model.model_name(),
                    embeddings.len(),
                    batch.len()
                )));
            }
            ids.extend(self.store.add_all(embeddings, batch).await?);
        }

        info!(
            model = self.embedding_model.model_name(),
            count = ids.len(),
            "Added {} embeddings",
            ids.len()
        );
        Ok(ids)
    }
}
