//! Embedding model registry
//!
//! Resolves a configured model name to a ready [`EmbeddingModel`]. The
//! dimension is fixed per name so that stores can be created before the
//! first embedding call.

pub mod hashing;

pub use hashing::HashingEmbeddingModel;

use crate::llm::{OpenAiConfig, OpenAiEmbeddingModel};
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::EmbeddingModel;
use std::sync::Arc;

/// Where a registered model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// OpenAI's hosted embeddings endpoint.
    OpenAi,
    /// An OpenAI-compatible server reached through `base_url`.
    Compatible,
    /// In-process feature hashing.
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingModelSpec {
    pub name: &'static str,
    pub dimension: usize,
    pub provider: EmbeddingProvider,
}

pub const SUPPORTED_EMBEDDING_MODELS: &[EmbeddingModelSpec] = &[
    EmbeddingModelSpec {
        name: "all-MiniLM-L6-v2",
        dimension: 384,
        provider: EmbeddingProvider::Compatible,
    },
    EmbeddingModelSpec {
        name: "text-embedding-3-small",
        dimension: 1536,
        provider: EmbeddingProvider::OpenAi,
    },
    EmbeddingModelSpec {
        name: "text-embedding-3-large",
        dimension: 3072,
        provider: EmbeddingProvider::OpenAi,
    },
    EmbeddingModelSpec {
        name: "text-embedding-ada-002",
        dimension: 1536,
        provider: EmbeddingProvider::OpenAi,
    },
    EmbeddingModelSpec {
        name: "hashing-384",
        dimension: 384,
        provider: EmbeddingProvider::Local,
    },
];

/// Looks up a model by name.
pub fn embedding_model_spec(name: &str) -> RagResult<&'static EmbeddingModelSpec> {
    SUPPORTED_EMBEDDING_MODELS
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| {
            let known: Vec<&str> = SUPPORTED_EMBEDDING_MODELS.iter().map(|s| s.name).collect();
            RagError::Configuration(format!(
                "unsupported embedding model '{name}' (supported: {})",
                known.join(", ")
            ))
        })
}

/// Credentials and endpoint used to build a registered model.
#[derive(Clone, Default)]
pub struct EmbeddingSettings {
    pub openai_api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl std::fmt::Debug for EmbeddingSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingSettings")
            .field("has_openai_api_key", &self.openai_api_key.is_some())
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Builds the named model. Missing credentials or endpoints are reported
/// as configuration errors without contacting any service.
pub fn create_embedding_model(
    name: &str,
    settings: &EmbeddingSettings,
) -> RagResult<Arc<dyn EmbeddingModel>> {
    let spec = embedding_model_spec(name)?;

    let with_timeout = |config: OpenAiConfig| match settings.timeout_secs {
        Some(secs) => config.with_timeout(secs),
        None => config,
    };

    match spec.provider {
        EmbeddingProvider::Local => Ok(Arc::new(HashingEmbeddingModel::new(spec.dimension))),
        EmbeddingProvider::OpenAi => {
            let key = settings
                .openai_api_key
                .as_deref()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    RagError::Configuration(format!("{name} requires an OpenAI API key"))
                })?;
            let mut config = OpenAiConfig::new(key);
            if let Some(url) = &settings.base_url {
                config = config.with_base_url(url.clone());
            }
            Ok(Arc::new(OpenAiEmbeddingModel::new(
                with_timeout(config),
                spec.name,
                spec.dimension,
            )?))
        }
        EmbeddingProvider::Compatible => {
            let url = settings.base_url.as_deref().ok_or_else(|| {
                RagError::Configuration(format!(
                    "{name} is served by an OpenAI-compatible endpoint; set embedding_base_url"
                ))
            })?;
            let key = settings.openai_api_key.clone().unwrap_or_default();
            let config = OpenAiConfig::new(key).with_base_url(url);
            Ok(Arc::new(OpenAiEmbeddingModel::new(
                with_timeout(config),
                spec.name,
                spec.dimension,
            )?))
        }
    }
}
