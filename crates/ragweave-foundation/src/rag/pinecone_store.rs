//! Pinecone-backed embedding store
//!
//! Talks to Pinecone over its REST API. The control plane
//! (`https://api.pinecone.io`) describes or creates the serverless index;
//! the data plane (`https://{index host}`) handles upserts, queries and
//! deletes inside one namespace.
//!
//! Segment text is stored in the vector metadata under
//! [`METADATA_TEXT_KEY`], next to the segment's own metadata.

use crate::http;
use async_trait::async_trait;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{
    Embedding, EmbeddingMatch, EmbeddingSearchRequest, EmbeddingStore, Filter, Metadata,
    MetadataValue, SimilarityMetric, TextSegment,
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const PINECONE_CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
pub const PINECONE_API_VERSION: &str = "2024-07";

/// Metadata key holding the segment text.
pub const METADATA_TEXT_KEY: &str = "text_segment";

/// Vectors per upsert request.
const UPSERT_BATCH_SIZE: usize = 100;

/// Configuration for connecting to a Pinecone index.
#[derive(Clone)]
pub struct PineconeConfig {
    pub api_key: String,
    pub index_name: String,
    /// Namespace inside the index; empty means the default namespace.
    pub namespace: String,
    /// Dimension used when the index has to be created.
    pub dimension: usize,
    pub metric: SimilarityMetric,
    pub cloud: String,
    pub region: String,
    pub control_plane_url: String,
    /// Whether to create the index if it does not exist
    pub create_index: bool,
    pub timeout_secs: u64,
    /// How long to wait for a freshly created index to become ready.
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl PineconeConfig {
    pub fn new(
        api_key: impl Into<String>,
        index_name: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            index_name: index_name.into(),
            namespace: String::new(),
            dimension,
            metric: SimilarityMetric::Cosine,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            control_plane_url: PINECONE_CONTROL_PLANE_URL.to_string(),
            create_index: true,
            timeout_secs: http::DEFAULT_HTTP_TIMEOUT_SECS,
            ready_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_control_plane_url(mut self, url: impl Into<String>) -> Self {
        self.control_plane_url = url.into();
        self
    }

    pub fn with_create_index(mut self, create: bool) -> Self {
        self.create_index = create;
        self
    }
}

impl std::fmt::Debug for PineconeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeConfig")
            .field("index_name", &self.index_name)
            .field("namespace", &self.namespace)
            .field("dimension", &self.dimension)
            .field("metric", &self.metric)
            .field("cloud", &self.cloud)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
    #[serde(default)]
    dimension: Option<usize>,
    status: IndexStatus,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    ready: bool,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f64,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

fn metric_name(metric: SimilarityMetric) -> &'static str {
    match metric {
        SimilarityMetric::Cosine => "cosine",
        SimilarityMetric::Euclidean => "euclidean",
        SimilarityMetric::DotProduct => "dotproduct",
    }
}

// =============================================================================
// Filter translation
// =============================================================================

fn metadata_value_to_json(value: &MetadataValue) -> Value {
    match value {
        MetadataValue::Bool(b) => json!(b),
        MetadataValue::Int(i) => json!(i),
        MetadataValue::Float(f) => json!(f),
        MetadataValue::Str(s) => json!(s),
    }
}

fn json_to_metadata_value(value: &Value) -> Option<MetadataValue> {
    match value {
        Value::Bool(b) => Some(MetadataValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(MetadataValue::Int(i)),
            None => n.as_f64().map(|f| {
                // Pinecone stores numbers as floats; whole numbers come back as ints.
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    MetadataValue::Int(f as i64)
                } else {
                    MetadataValue::Float(f)
                }
            }),
        },
        Value::String(s) => Some(MetadataValue::Str(s.clone())),
        Value::Null => None,
        other => Some(MetadataValue::Str(other.to_string())),
    }
}

/// Negation pushed down to the leaves, since Pinecone has no `$not`.
fn negated(filter: &Filter) -> RagResult<Filter> {
    Ok(match filter {
        Filter::Eq { key, value } => Filter::ne(key.clone(), value.clone()),
        Filter::Ne { key, value } => Filter::eq(key.clone(), value.clone()),
        Filter::Gt { key, value } => Filter::lte(key.clone(), value.clone()),
        Filter::Gte { key, value } => Filter::lt(key.clone(), value.clone()),
        Filter::Lt { key, value } => Filter::gte(key.clone(), value.clone()),
        Filter::Lte { key, value } => Filter::gt(key.clone(), value.clone()),
        Filter::In { key, values } => Filter::not_in(key.clone(), values.clone()),
        Filter::NotIn { key, values } => Filter::is_in(key.clone(), values.clone()),
        Filter::And { left, right } => negated(left)?.or(negated(right)?),
        Filter::Or { left, right } => negated(left)?.and(negated(right)?),
        Filter::Not { inner } => (**inner).clone(),
        Filter::Contains { key, .. } => {
            return Err(RagError::Store(format!(
                "Pinecone does not support substring filters (key '{key}')"
            )));
        }
    })
}

/// Translates a filter into Pinecone's metadata filter language.
pub fn to_pinecone_filter(filter: &Filter) -> RagResult<Value> {
    let leaf = |op: &str, key: &str, value: Value| json!({ key: { op: value } });
    let list = |values: &Vec<MetadataValue>| {
        Value::Array(values.iter().map(metadata_value_to_json).collect())
    };

    Ok(match filter {
        Filter::Eq { key, value } => leaf("$eq", key, metadata_value_to_json(value)),
        Filter::Ne { key, value } => leaf("$ne", key, metadata_value_to_json(value)),
        Filter::Gt { key, value } => leaf("$gt", key, metadata_value_to_json(value)),
        Filter::Gte { key, value } => leaf("$gte", key, metadata_value_to_json(value)),
        Filter::Lt { key, value } => leaf("$lt", key, metadata_value_to_json(value)),
        Filter::Lte { key, value } => leaf("$lte", key, metadata_value_to_json(value)),
        Filter::In { key, values } => leaf("$in", key, list(values)),
        Filter::NotIn { key, values } => leaf("$nin", key, list(values)),
        Filter::And { left, right } => {
            json!({ "$and": [to_pinecone_filter(left)?, to_pinecone_filter(right)?] })
        }
        Filter::Or { left, right } => {
            json!({ "$or": [to_pinecone_filter(left)?, to_pinecone_filter(right)?] })
        }
        Filter::Not { inner } => to_pinecone_filter(&negated(inner)?)?,
        Filter::Contains { key, .. } => {
            return Err(RagError::Store(format!(
                "Pinecone does not support substring filters (key '{key}')"
            )));
        }
    })
}

fn segment_to_metadata(segment: &TextSegment) -> Value {
    let mut map = Map::new();
    for (key, value) in segment.metadata.iter() {
        map.insert(key.clone(), metadata_value_to_json(value));
    }
    map.insert(METADATA_TEXT_KEY.to_string(), json!(segment.text));
    Value::Object(map)
}

fn match_to_segment(metadata: Option<Map<String, Value>>) -> TextSegment {
    let mut text = String::new();
    let mut out = Metadata::new();
    for (key, value) in metadata.unwrap_or_default() {
        if key == METADATA_TEXT_KEY {
            if let Value::String(s) = value {
                text = s;
            }
            continue;
        }
        if let Some(converted) = json_to_metadata_value(&value) {
            out.insert(key, converted);
        }
    }
    TextSegment {
        text,
        metadata: out,
    }
}

// =============================================================================
// Store
// =============================================================================

/// Pinecone-backed embedding store.
pub struct PineconeEmbeddingStore {
    client: reqwest::Client,
    api_key: String,
    host_url: String,
    namespace: String,
    metric: SimilarityMetric,
}

impl PineconeEmbeddingStore {
    /// Connects to the index, creating it first when configured to and
    /// waiting until it reports ready.
    pub async fn connect(config: PineconeConfig) -> RagResult<Self> {
        http::require_key("Pinecone", &config.api_key)?;
        if config.index_name.trim().is_empty() {
            return Err(RagError::Configuration("Pinecone index name is empty".into()));
        }
        let client = http::build_client(config.timeout_secs)?;

        let description = match Self::describe_index(&client, &config).await? {
            Some(found) => found,
            None if config.create_index => {
                Self::create_index(&client, &config).await?;
                Self::wait_until_ready(&client, &config).await?
            }
            None => {
                return Err(RagError::Store(format!(
                    "Pinecone index '{}' does not exist",
                    config.index_name
                )));
            }
        };

        if let Some(dimension) = description.dimension {
            if dimension != config.dimension {
                return Err(RagError::Configuration(format!(
                    "Pinecone index '{}' has dimension {dimension}, embedding model produces {}",
                    config.index_name, config.dimension
                )));
            }
        }

        let host_url = if description.host.starts_with("http") {
            description.host
        } else {
            format!("https://{}", description.host)
        };
        debug!(index = %config.index_name, host = %host_url, "connected to Pinecone");

        Ok(Self {
            client,
            api_key: config.api_key,
            host_url,
            namespace: config.namespace,
            metric: config.metric,
        })
    }

    fn control_request(
        client: &reqwest::Client,
        config: &PineconeConfig,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", config.control_plane_url.trim_end_matches('/'));
        client
            .request(method, url)
            .header("Api-Key", &config.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
    }

    async fn describe_index(
        client: &reqwest::Client,
        config: &PineconeConfig,
    ) -> RagResult<Option<IndexDescription>> {
        let resp = Self::control_request(
            client,
            config,
            reqwest::Method::GET,
            &format!("/indexes/{}", config.index_name),
        )
        .send()
        .await
        .map_err(|e| http::map_error(e, RagError::Store))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        http::read_json(resp, RagError::Store).await.map(Some)
    }

    async fn create_index(client: &reqwest::Client, config: &PineconeConfig) -> RagResult<()> {
        info!(
            index = %config.index_name,
            dimension = config.dimension,
            cloud = %config.cloud,
            region = %config.region,
            "creating Pinecone index"
        );
        let body = json!({
            "name": config.index_name,
            "dimension": config.dimension,
            "metric": metric_name(config.metric),
            "spec": { "serverless": { "cloud": config.cloud, "region": config.region } },
        });
        let resp = Self::control_request(client, config, reqwest::Method::POST, "/indexes")
            .json(&body)
            .send()
            .await
            .map_err(|e| http::map_error(e, RagError::Store))?;

        // Another client may have created it in the meantime.
        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        http::read_body(resp, RagError::Store).await.map(|_| ())
    }

    async fn wait_until_ready(
        client: &reqwest::Client,
        config: &PineconeConfig,
    ) -> RagResult<IndexDescription> {
        let started = Instant::now();
        loop {
            if let Some(description) = Self::describe_index(client, config).await? {
                if description.status.ready {
                    return Ok(description);
                }
                debug!(state = ?description.status.state, "waiting for Pinecone index");
            }
            if started.elapsed() >= config.ready_timeout {
                return Err(RagError::timeout(config.ready_timeout.as_millis() as u64));
            }
            tokio::time::sleep(config.poll_interval).await;
        }
    }

    fn data_request(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.host_url))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
    }

    async fn upsert(&self, vectors: Vec<Value>) -> RagResult<()> {
        let body = json!({ "vectors": vectors, "namespace": self.namespace });
        let resp = self
            .data_request("/vectors/upsert")
            .json(&body)
            .send()
            .await
            .map_err(|e| http::map_error(e, RagError::Store))?;
        http::read_body(resp, RagError::Store).await.map(|_| ())
    }

    fn to_relevance(&self, raw: f64) -> f64 {
        match self.metric {
            SimilarityMetric::Cosine => crate::rag::similarity::relevance_from_cosine(raw),
            _ => raw,
        }
    }
}

#[async_trait]
impl EmbeddingStore for PineconeEmbeddingStore {
    async fn add(&self, embedding: Embedding, segment: TextSegment) -> RagResult<String> {
        let mut ids = self.add_all(vec![embedding], vec![segment]).await?;
        ids.pop()
            .ok_or_else(|| RagError::Internal("upsert returned no id".into()))
    }

    async fn add_all(
        &self,
        embeddings: Vec<Embedding>,
        segments: Vec<TextSegment>,
    ) -> RagResult<Vec<String>> {
        if embeddings.len() != segments.len() {
            return Err(RagError::InvalidInput(format!(
                "{} embeddings for {} segments",
                embeddings.len(),
                segments.len()
            )));
        }

        let mut ids = Vec::with_capacity(segments.len());
        let mut batch = Vec::with_capacity(UPSERT_BATCH_SIZE);
        for (embedding, segment) in embeddings.into_iter().zip(segments) {
            let id = Uuid::new_v4().to_string();
            batch.push(json!({
                "id": id,
                "values": embedding,
                "metadata": segment_to_metadata(&segment),
            }));
            ids.push(id);
            if batch.len() == UPSERT_BATCH_SIZE {
                self.upsert(std::mem::take(&mut batch)).await?;
            }
        }
        if !batch.is_empty() {
            self.upsert(batch).await?;
        }
        debug!(namespace = %self.namespace, count = ids.len(), "upserted vectors");
        Ok(ids)
    }

    async fn search(&self, request: &EmbeddingSearchRequest) -> RagResult<Vec<EmbeddingMatch>> {
        let mut body = json!({
            "namespace": self.namespace,
            "vector": request.query_embedding,
            "topK": request.max_results,
            "includeMetadata": true,
            "includeValues": false,
        });
        if let Some(filter) = &request.filter {
            body["filter"] = to_pinecone_filter(filter)?;
        }

        let resp = self
            .data_request("/query")
            .json(&body)
            .send()
            .await
            .map_err(|e| http::map_error(e, RagError::Store))?;
        let parsed: QueryResponse = http::read_json(resp, RagError::Store).await?;

        let mut matches: Vec<EmbeddingMatch> = parsed
            .matches
            .into_iter()
            .map(|m| EmbeddingMatch {
                score: self.to_relevance(m.score),
                id: m.id,
                segment: match_to_segment(m.metadata),
            })
            .filter(|m| m.score >= request.min_score)
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(request.max_results);
        Ok(matches)
    }

    async fn remove_all(&self) -> RagResult<()> {
        let body = json!({ "deleteAll": true, "namespace": self.namespace });
        let resp = self
            .data_request("/vectors/delete")
            .json(&body)
            .send()
            .await
            .map_err(|e| http::map_error(e, RagError::Store))?;

        // Deleting from a namespace that was never written is a no-op.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            warn!(namespace = %self.namespace, "namespace not found, nothing to delete");
            return Ok(());
        }
        http::read_body(resp, RagError::Store).await?;
        info!(namespace = %self.namespace, "deleted all vectors");
        Ok(())
    }
}
