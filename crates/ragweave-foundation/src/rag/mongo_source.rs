//! MongoDB document source
//!
//! Reads the article collection directly. Only `id`, `content` and
//! `category` are projected; each record maps to the same metadata as
//! [`JsonLinesDocumentSource`](super::JsonLinesDocumentSource).

use super::source::{CATEGORY_KEY, DOCUMENT_ID_KEY, MONGO_ID_KEY};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::Client;
use mongodb::bson::{Bson, Document as BsonDocument, doc};
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{Document, DocumentSource};
use std::fmt;
use tracing::{debug, warn};

/// Connection settings. The URI usually carries credentials and is never
/// printed.
#[derive(Clone)]
pub struct MongoDbConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

impl MongoDbConfig {
    pub fn new(
        uri: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Debug for MongoDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDbConfig")
            .field("uri", &"<redacted>")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .finish()
    }
}

/// Documents read from a MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoDbDocumentSource {
    config: MongoDbConfig,
    label: String,
}

impl MongoDbDocumentSource {
    pub fn new(config: MongoDbConfig) -> Self {
        let label = format!("mongodb:{}.{}", config.database, config.collection);
        Self { config, label }
    }

    /// Maps one projected record. Records with blank content are skipped.
    pub fn document_from_record(record: &BsonDocument) -> RagResult<Option<Document>> {
        let mongo_id = field(record, "_id")?;
        let document_id = field(record, "id")
            .map_err(|e| RagError::Serialization(format!("record {mongo_id}: {e}")))?;
        let content = field(record, "content")
            .map_err(|e| RagError::Serialization(format!("record {mongo_id}: {e}")))?;
        let category = field(record, "category")
            .map_err(|e| RagError::Serialization(format!("record {mongo_id}: {e}")))?;

        if content.trim().is_empty() {
            warn!(mongo_id = %mongo_id, "skipping record without content");
            return Ok(None);
        }
        Ok(Some(
            Document::new(content)
                .with_metadata(MONGO_ID_KEY, mongo_id)
                .with_metadata(DOCUMENT_ID_KEY, document_id)
                .with_metadata(CATEGORY_KEY, category),
        ))
    }
}

fn field(record: &BsonDocument, key: &str) -> RagResult<String> {
    match record.get(key) {
        Some(Bson::ObjectId(oid)) => Ok(oid.to_hex()),
        Some(Bson::String(s)) => Ok(s.clone()),
        Some(Bson::Int32(n)) => Ok(n.to_string()),
        Some(Bson::Int64(n)) => Ok(n.to_string()),
        Some(other) => Err(RagError::Serialization(format!(
            "field `{key}` has unsupported type {:?}",
            other.element_type()
        ))),
        None => Err(RagError::Serialization(format!("field `{key}` is missing"))),
    }
}

#[async_trait]
impl DocumentSource for MongoDbDocumentSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self) -> RagResult<Vec<Document>> {
        let client = Client::with_uri_str(&self.config.uri)
            .await
            .map_err(|e| RagError::Store(format!("cannot connect to MongoDB: {e}")))?;
        let collection = client
            .database(&self.config.database)
            .collection::<BsonDocument>(&self.config.collection);

        let mut cursor = collection
            .find(doc! {})
            .projection(doc! { "id": 1, "content": 1, "category": 1 })
            .await
            .map_err(|e| RagError::Store(format!("{}: {e}", self.label)))?;

        let mut documents = Vec::new();
        while let Some(record) = cursor
            .try_next()
            .await
            .map_err(|e| RagError::Store(format!("{}: {e}", self.label)))?
        {
            if let Some(document) = Self::document_from_record(&record)? {
                documents.push(document);
            }
        }
        debug!(source = %self.label, count = documents.len(), "records available");
        Ok(documents)
    }
}
