//! Document loaders for ingesting text files
//!
//! Reads files from disk into kernel [`Document`]s. Each file becomes one
//! document carrying `file_name` and `absolute_directory_path` metadata.

use async_trait::async_trait;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{Document, DocumentSource};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const FILE_NAME_KEY: &str = "file_name";
pub const DIRECTORY_KEY: &str = "absolute_directory_path";

// =============================================================================
// Errors
// =============================================================================

/// Errors from document loading.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoaderError {
    /// File IO error (includes the path that failed)
    #[error("Failed to read '{path}': {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error("Document is empty: {0}")]
    EmptyDocument(String),

    #[error("No documents matching '*.{extension}' in {directory}")]
    NoDocuments { directory: String, extension: String },
}

/// Result type for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;

impl From<LoaderError> for RagError {
    fn from(err: LoaderError) -> Self {
        RagError::Io(err.to_string())
    }
}

// =============================================================================
// TextDocumentLoader
// =============================================================================

/// Loads plain text files.
#[derive(Debug, Clone, Default)]
pub struct TextDocumentLoader;

impl TextDocumentLoader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Loads one file.
    pub fn load_file(&self, path: &Path) -> LoaderResult<Document> {
        let io_error = |source| LoaderError::IoError {
            path: path.display().to_string(),
            source,
        };
        let content = std::fs::read_to_string(path).map_err(io_error)?;

        if content.trim().is_empty() {
            return Err(LoaderError::EmptyDocument(path.display().to_string()));
        }

        let absolute = std::fs::canonicalize(path).map_err(io_error)?;
        let mut document = Document::new(content);
        if let Some(name) = absolute.file_name().and_then(|n| n.to_str()) {
            document.metadata.insert(FILE_NAME_KEY, name);
        }
        if let Some(dir) = absolute.parent() {
            document
                .metadata
                .insert(DIRECTORY_KEY, dir.display().to_string());
        }
        Ok(document)
    }

    /// Loads every `*.{extension}` file directly inside `dir`, sorted by
    /// file name.
    pub fn load_directory(&self, dir: &Path, extension: &str) -> LoaderResult<Vec<Document>> {
        let entries = std::fs::read_dir(dir).map_err(|source| LoaderError::IoError {
            path: dir.display().to_string(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(LoaderError::NoDocuments {
                directory: dir.display().to_string(),
                extension: extension.to_string(),
            });
        }

        paths.iter().map(|path| self.load_file(path)).collect()
    }
}

/// A directory of text files exposed as a [`DocumentSource`].
#[derive(Debug, Clone)]
pub struct DirectoryDocumentSource {
    directory: PathBuf,
    extension: String,
    label: String,
}

impl DirectoryDocumentSource {
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let directory = directory.into();
        let extension = extension.into();
        let label = format!("{}/*.{}", directory.display(), extension);
        Self {
            directory,
            extension,
            label,
        }
    }
}

#[async_trait]
impl DocumentSource for DirectoryDocumentSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self) -> RagResult<Vec<Document>> {
        let directory = self.directory.clone();
        let extension = self.extension.clone();
        let documents = tokio::task::spawn_blocking(move || {
            TextDocumentLoader::new().load_directory(&directory, &extension)
        })
        .await
        .map_err(|e| RagError::Internal(e.to_string()))??;

        debug!(source = %self.label, count = documents.len(), "loaded documents");
        Ok(documents)
    }
}
