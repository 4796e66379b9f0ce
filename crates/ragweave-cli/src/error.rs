use ragweave_kernel::RagError;
use ragweave_kernel::config::ConfigError;

/// Errors surfaced by `ragweave` commands.
#[derive(thiserror::Error, Debug)]
pub enum CliError {
    /// Invalid settings or unusable key files, detected before any network call.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] ConfigError),

    #[error(transparent)]
    Rag(#[from] RagError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
