//! JSON Lines document source
//!
//! Reads one record per line in the shape `mongoexport` produces for an
//! article collection:
//!
//! ```text
//! {"_id":{"$oid":"665f..."},"id":"doc-1","content":"...","category":"physics"}
//! ```
//!
//! Every record becomes a [`Document`] with `mongoid`, `documentid` and
//! `category` metadata.

use async_trait::async_trait;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{Document, DocumentSource};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const MONGO_ID_KEY: &str = "mongoid";
pub const DOCUMENT_ID_KEY: &str = "documentid";
pub const CATEGORY_KEY: &str = "category";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordId {
    ObjectId {
        #[serde(rename = "$oid")]
        oid: String,
    },
    Plain(String),
    Number(i64),
}

impl RecordId {
    fn into_string(self) -> String {
        match self {
            Self::ObjectId { oid } => oid,
            Self::Plain(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(rename = "_id")]
    mongo_id: Option<RecordId>,
    id: RecordId,
    content: String,
    category: String,
}

impl Record {
    fn into_document(self, line_number: usize) -> Document {
        let mongo_id = self
            .mongo_id
            .map(RecordId::into_string)
            .unwrap_or_else(|| format!("line-{line_number}"));
        Document::new(self.content)
            .with_metadata(MONGO_ID_KEY, mongo_id)
            .with_metadata(DOCUMENT_ID_KEY, self.id.into_string())
            .with_metadata(CATEGORY_KEY, self.category)
    }
}

/// Documents read from a `.jsonl` file.
#[derive(Debug, Clone)]
pub struct JsonLinesDocumentSource {
    path: PathBuf,
    label: String,
}

impl JsonLinesDocumentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path.display().to_string();
        Self { path, label }
    }

    /// Parses file content. Blank lines are skipped; a malformed record is
    /// an error naming its line.
    pub fn parse(content: &str) -> RagResult<Vec<Document>> {
        let mut documents = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line_number = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(line).map_err(|e| {
                RagError::Serialization(format!("record on line {line_number}: {e}"))
            })?;
            if record.content.trim().is_empty() {
                warn!(line = line_number, "skipping record without content");
                continue;
            }
            documents.push(record.into_document(line_number));
        }
        Ok(documents)
    }
}

#[async_trait]
impl DocumentSource for JsonLinesDocumentSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self) -> RagResult<Vec<Document>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| RagError::Io(format!("{}: {e}", self.path.display())))?;
        let documents = Self::parse(&content)?;
        debug!(source = %self.label, count = documents.len(), "records available");
        Ok(documents)
    }
}
