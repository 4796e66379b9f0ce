//! CLI context: builds models, stores and retrievers from the configuration

use crate::CliError;
use crate::config::{ApiKey, AppConfig, VectorStoreKind};
use ragweave_foundation::embedding::{EmbeddingProvider, EmbeddingSettings, create_embedding_model};
use ragweave_foundation::llm::{OpenAiChatModel, OpenAiConfig};
#[cfg(feature = "mongodb")]
use ragweave_foundation::rag::{MongoDbConfig, MongoDbDocumentSource};
use ragweave_foundation::rag::{
    JsonLinesDocumentSource, PineconeConfig, PineconeEmbeddingStore, TextDocumentLoader,
};
#[cfg(feature = "qdrant")]
use ragweave_foundation::rag::{QdrantConfig, QdrantEmbeddingStore, SimilarityMetric};
use ragweave_foundation::retrieval::web_search::{TavilyConfig, TavilyWebSearchEngine};
use ragweave_foundation::scoring::{CohereConfig, CohereScoringModel};
use ragweave_kernel::RagError;
use ragweave_kernel::rag::{
    ChatModel, Document, DocumentSource, EmbeddingModel, EmbeddingStore, ScoringModel,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared context for CLI commands
pub struct CliContext {
    pub config: AppConfig,
}

impl CliContext {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// The configured embedding model. OpenAI-hosted models need the OpenAI
    /// key; compatible servers use it when one is configured.
    pub fn embedding_model(&self) -> Result<Arc<dyn EmbeddingModel>, CliError> {
        let spec = self.config.embedding_spec()?;
        let openai_api_key = match spec.provider {
            EmbeddingProvider::OpenAi => Some(self.config.api_key(ApiKey::OpenAi)?),
            EmbeddingProvider::Compatible if self.config.openai_api_key_file.is_some() => {
                Some(self.config.api_key(ApiKey::OpenAi)?)
            }
            _ => None,
        };
        let settings = EmbeddingSettings {
            openai_api_key,
            base_url: self.config.embedding_base_url.clone(),
            timeout_secs: None,
        };
        debug!(model = spec.name, dimension = spec.dimension, "embedding model");
        Ok(create_embedding_model(spec.name, &settings)?)
    }

    pub fn chat_model(&self) -> Result<Arc<dyn ChatModel>, CliError> {
        self.chat_model_with_temperature(self.config.chat_temperature)
    }

    pub fn chat_model_with_temperature(
        &self,
        temperature: Option<f32>,
    ) -> Result<Arc<dyn ChatModel>, CliError> {
        let mut config = OpenAiConfig::new(self.config.api_key(ApiKey::OpenAi)?)
            .with_model(&self.config.chat_model);
        if let Some(t) = temperature {
            config = config.with_temperature(t);
        }
        Ok(Arc::new(OpenAiChatModel::new(config)?))
    }

    pub fn scoring_model(&self) -> Result<Arc<dyn ScoringModel>, CliError> {
        let config = CohereConfig::new(self.config.api_key(ApiKey::Cohere)?)
            .with_model(&self.config.reranking_model);
        Ok(Arc::new(CohereScoringModel::new(config)?))
    }

    pub fn web_search_engine(&self) -> Result<Arc<TavilyWebSearchEngine>, CliError> {
        let config = TavilyConfig::new(self.config.api_key(ApiKey::Tavily)?);
        Ok(Arc::new(TavilyWebSearchEngine::new(config)?))
    }

    /// The store selected by `vector_store`.
    pub async fn embedding_store(&self) -> Result<Arc<dyn EmbeddingStore>, CliError> {
        match self.config.vector_store {
            VectorStoreKind::Pinecone => Ok(self.pinecone_store().await?),
            VectorStoreKind::Qdrant => self.qdrant_store().await,
        }
    }

    #[cfg(feature = "qdrant")]
    async fn qdrant_store(&self) -> Result<Arc<dyn EmbeddingStore>, CliError> {
        let api_key = match self.config.qdrant_api_key_file {
            Some(_) => Some(self.config.api_key(ApiKey::Qdrant)?),
            None => None,
        };
        let config = QdrantConfig {
            url: self.config.qdrant_url.clone(),
            api_key,
            collection_name: self.config.index_name.clone(),
            vector_dimensions: self.config.embedding_spec()?.dimension as u64,
            metric: SimilarityMetric::Cosine,
            create_collection: true,
        };
        info!(
            url = %self.config.qdrant_url,
            collection = %self.config.index_name,
            "connecting to Qdrant"
        );
        Ok(Arc::new(QdrantEmbeddingStore::new(config).await?))
    }

    #[cfg(not(feature = "qdrant"))]
    async fn qdrant_store(&self) -> Result<Arc<dyn EmbeddingStore>, CliError> {
        Err(CliError::ConfigError(
            "vector_store qdrant needs ragweave built with the `qdrant` feature".into(),
        ))
    }

    /// Where `load` reads its records: MongoDB when `mongodb_uri_file` is
    /// set, otherwise the JSON Lines file.
    pub fn record_source(&self) -> Result<Box<dyn DocumentSource>, CliError> {
        if self.config.mongodb_uri_file.is_some() {
            return self.mongodb_source();
        }
        Ok(Box::new(JsonLinesDocumentSource::new(&self.config.records_file)))
    }

    #[cfg(feature = "mongodb")]
    fn mongodb_source(&self) -> Result<Box<dyn DocumentSource>, CliError> {
        let config = MongoDbConfig::new(
            self.config.api_key(ApiKey::MongoDbUri)?,
            &self.config.mongodb_database,
            &self.config.mongodb_collection,
        );
        Ok(Box::new(MongoDbDocumentSource::new(config)))
    }

    #[cfg(not(feature = "mongodb"))]
    fn mongodb_source(&self) -> Result<Box<dyn DocumentSource>, CliError> {
        Err(CliError::ConfigError(
            "mongodb_uri_file needs ragweave built with the `mongodb` feature".into(),
        ))
    }

    /// Connects to the configured Pinecone index, creating it when missing.
    /// The key is read before anything is sent.
    pub async fn pinecone_store(&self) -> Result<Arc<PineconeEmbeddingStore>, CliError> {
        let api_key = self.config.api_key(ApiKey::Pinecone)?;
        let dimension = self.config.embedding_spec()?.dimension;
        let config = PineconeConfig::new(api_key, &self.config.index_name, dimension)
            .with_namespace(&self.config.namespace);
        info!(
            index = %self.config.index_name,
            namespace = %self.config.namespace,
            "connecting to Pinecone"
        );
        Ok(Arc::new(PineconeEmbeddingStore::connect(config).await?))
    }

    /// Every `.txt` file of the documents directory.
    pub fn documents(&self) -> Result<Vec<Document>, CliError> {
        self.documents_in(&self.config.documents_dir)
    }

    pub fn documents_in(&self, dir: &Path) -> Result<Vec<Document>, CliError> {
        let documents = TextDocumentLoader::new()
            .load_directory(dir, "txt")
            .map_err(RagError::from)?;
        debug!(count = documents.len(), dir = %dir.display(), "loaded documents");
        Ok(documents)
    }

    /// One document by file name inside the documents directory.
    pub fn document(&self, file_name: &str) -> Result<Document, CliError> {
        let path = self.config.documents_dir.join(file_name);
        Ok(TextDocumentLoader::new()
            .load_file(&path)
            .map_err(RagError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(config: AppConfig) -> CliContext {
        CliContext::new(config)
    }

    #[test]
    fn test_local_embedding_model_needs_no_key() {
        let ctx = context(AppConfig {
            embedding_model: "hashing-384".into(),
            ..AppConfig::default()
        });
        assert!(ctx.embedding_model().is_ok());
    }

    #[test]
    fn test_openai_embedding_model_requires_key_file() {
        let ctx = context(AppConfig {
            embedding_model: "text-embedding-3-small".into(),
            ..AppConfig::default()
        });
        let err = ctx.embedding_model().err().unwrap().to_string();
        assert!(err.contains("openai_api_key_file"));
    }

    #[tokio::test]
    async fn test_pinecone_key_checked_before_connecting() {
        let ctx = context(AppConfig::default());
        let err = ctx.embedding_store().await.err().unwrap().to_string();
        assert!(err.contains("pinecone_api_key_file is not set"));
    }

    #[cfg(not(feature = "qdrant"))]
    #[tokio::test]
    async fn test_qdrant_store_needs_feature() {
        let ctx = context(AppConfig {
            vector_store: VectorStoreKind::Qdrant,
            ..AppConfig::default()
        });
        let err = ctx.embedding_store().await.err().unwrap().to_string();
        assert!(err.contains("`qdrant` feature"));
    }

    #[test]
    fn test_records_come_from_jsonl_by_default() {
        let ctx = context(AppConfig {
            records_file: "data/records.jsonl".into(),
            ..AppConfig::default()
        });
        assert_eq!(ctx.record_source().unwrap().name(), "data/records.jsonl");
    }

    #[cfg(not(feature = "mongodb"))]
    #[test]
    fn test_mongodb_source_needs_feature() {
        let ctx = context(AppConfig {
            mongodb_uri_file: Some("mongodb.uri".into()),
            ..AppConfig::default()
        });
        let err = ctx.record_source().err().unwrap().to_string();
        assert!(err.contains("`mongodb` feature"));
    }

    #[cfg(feature = "mongodb")]
    #[test]
    fn test_mongodb_source_selected_by_uri_file() {
        let dir = tempfile::tempdir().unwrap();
        let uri = dir.path().join("mongodb.uri");
        std::fs::write(&uri, "mongodb://localhost:27017\n").unwrap();
        let ctx = context(AppConfig {
            mongodb_uri_file: Some(uri),
            mongodb_database: "news".into(),
            ..AppConfig::default()
        });
        assert_eq!(ctx.record_source().unwrap().name(), "mongodb:news.articles");

        let ctx = context(AppConfig {
            mongodb_uri_file: Some(dir.path().join("absent.uri")),
            ..AppConfig::default()
        });
        let err = ctx.record_source().err().unwrap().to_string();
        assert!(err.contains("cannot read mongodb_uri_file"));
    }

    #[test]
    fn test_documents_directory_must_hold_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(AppConfig {
            documents_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        });
        assert!(ctx.documents().is_err());

        std::fs::write(dir.path().join("terms.txt"), "Reservations can be cancelled.").unwrap();
        let docs = ctx.documents().unwrap();
        assert_eq!(docs.len(), 1);
    }
}
