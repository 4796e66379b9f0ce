//! Qdrant-backed embedding store implementation
//!
//! Stores segments as Qdrant points: the embedding as the vector, the text
//! and metadata as payload fields. Metadata filters are translated to
//! Qdrant's `must` / `should` / `must_not` conditions.

use crate::rag::similarity::relevance_from_cosine;
use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter as QdrantFilter, PointStruct,
    QueryPointsBuilder, Range, ScoredPoint, UpsertPointsBuilder, VectorParamsBuilder,
    value::Kind,
};
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{
    Embedding, EmbeddingMatch, EmbeddingSearchRequest, EmbeddingStore, Filter, Metadata,
    MetadataValue, SimilarityMetric, TextSegment,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Reserved payload keys for internal storage.
const PAYLOAD_KEY_TEXT: &str = "_text";
const PAYLOAD_KEY_METADATA_PREFIX: &str = "meta_";

/// Configuration for connecting to a Qdrant instance.
#[derive(Clone)]
pub struct QdrantConfig {
    /// Qdrant server URL (e.g., "http://localhost:6334")
    pub url: String,
    /// Optional API key for Qdrant Cloud or authenticated instances
    pub api_key: Option<String>,
    pub collection_name: String,
    pub vector_dimensions: u64,
    pub metric: SimilarityMetric,
    /// Whether to create the collection if it does not exist
    pub create_collection: bool,
}

/// Qdrant-backed embedding store.
pub struct QdrantEmbeddingStore {
    client: Qdrant,
    collection_name: String,
    vector_dimensions: u64,
    metric: SimilarityMetric,
}

fn payload_key(key: &str) -> String {
    format!("{PAYLOAD_KEY_METADATA_PREFIX}{key}")
}

fn to_payload_value(value: &MetadataValue) -> qdrant_client::qdrant::Value {
    match value {
        MetadataValue::Bool(b) => (*b).into(),
        MetadataValue::Int(i) => (*i).into(),
        MetadataValue::Float(f) => (*f).into(),
        MetadataValue::Str(s) => s.clone().into(),
    }
}

fn from_payload_value(value: &qdrant_client::qdrant::Value) -> Option<MetadataValue> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(MetadataValue::Str(s.clone())),
        Some(Kind::IntegerValue(i)) => Some(MetadataValue::Int(*i)),
        Some(Kind::DoubleValue(f)) => Some(MetadataValue::Float(*f)),
        Some(Kind::BoolValue(b)) => Some(MetadataValue::Bool(*b)),
        _ => None,
    }
}

fn match_condition(key: &str, value: &MetadataValue) -> RagResult<Condition> {
    let key = payload_key(key);
    Ok(match value {
        MetadataValue::Str(s) => Condition::matches(key, s.clone()),
        MetadataValue::Int(i) => Condition::matches(key, *i),
        MetadataValue::Bool(b) => Condition::matches(key, *b),
        MetadataValue::Float(f) => Condition::range(
            key,
            Range {
                gte: Some(*f),
                lte: Some(*f),
                ..Default::default()
            },
        ),
    })
}

fn range_condition(
    key: &str,
    value: &MetadataValue,
    build: fn(f64) -> Range,
) -> RagResult<Condition> {
    let bound = value.as_f64().ok_or_else(|| {
        RagError::Store(format!(
            "Qdrant range filters need a numeric value for '{key}', got '{value}'"
        ))
    })?;
    Ok(Condition::range(payload_key(key), build(bound)))
}

fn any_condition(key: &str, values: &[MetadataValue]) -> RagResult<Condition> {
    let conditions = values
        .iter()
        .map(|v| match_condition(key, v))
        .collect::<RagResult<Vec<_>>>()?;
    Ok(QdrantFilter::should(conditions).into())
}

/// Translates a filter into a Qdrant condition tree.
pub fn to_qdrant_condition(filter: &Filter) -> RagResult<Condition> {
    Ok(match filter {
        Filter::Eq { key, value } => match_condition(key, value)?,
        Filter::Ne { key, value } => QdrantFilter::must_not([match_condition(key, value)?]).into(),
        Filter::Gt { key, value } => range_condition(key, value, |b| Range {
            gt: Some(b),
            ..Default::default()
        })?,
        Filter::Gte { key, value } => range_condition(key, value, |b| Range {
            gte: Some(b),
            ..Default::default()
        })?,
        Filter::Lt { key, value } => range_condition(key, value, |b| Range {
            lt: Some(b),
            ..Default::default()
        })?,
        Filter::Lte { key, value } => range_condition(key, value, |b| Range {
            lte: Some(b),
            ..Default::default()
        })?,
        Filter::In { key, values } => any_condition(key, values)?,
        Filter::NotIn { key, values } => {
            QdrantFilter::must_not([any_condition(key, values)?]).into()
        }
        Filter::Contains { key, value } => Condition::matches_text(payload_key(key), value.clone()),
        Filter::And { left, right } => {
            QdrantFilter::must([to_qdrant_condition(left)?, to_qdrant_condition(right)?]).into()
        }
        Filter::Or { left, right } => {
            QdrantFilter::should([to_qdrant_condition(left)?, to_qdrant_condition(right)?]).into()
        }
        Filter::Not { inner } => QdrantFilter::must_not([to_qdrant_condition(inner)?]).into(),
    })
}

impl QdrantEmbeddingStore {
    /// Connects to the Qdrant instance and optionally creates the collection.
    pub async fn new(config: QdrantConfig) -> RagResult<Self> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(api_key) = config.api_key {
            builder = builder.api_key(api_key);
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Configuration(format!("Qdrant connection failed: {e}")))?;

        let store = Self {
            client,
            collection_name: config.collection_name,
            vector_dimensions: config.vector_dimensions,
            metric: config.metric,
        };

        if config.create_collection {
            store.ensure_collection_exists().await?;
        }

        Ok(store)
    }

    fn to_qdrant_distance(metric: SimilarityMetric) -> Distance {
        match metric {
            SimilarityMetric::Cosine => Distance::Cosine,
            SimilarityMetric::Euclidean => Distance::Euclid,
            SimilarityMetric::DotProduct => Distance::Dot,
        }
    }

    async fn ensure_collection_exists(&self) -> RagResult<()> {
        let exists = self
            .client
            .collection_exists(&self.collection_name)
            .await
            .map_err(|e| RagError::Store(format!("Qdrant collection check failed: {e}")))?;

        if !exists {
            let distance = Self::to_qdrant_distance(self.metric);
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection_name)
                        .vectors_config(VectorParamsBuilder::new(self.vector_dimensions, distance)),
                )
                .await
                .map_err(|e| {
                    RagError::Store(format!(
                        "Failed to create Qdrant collection '{}': {e}",
                        self.collection_name
                    ))
                })?;
        }

        Ok(())
    }

    fn segment_to_point(id: &str, embedding: Embedding, segment: &TextSegment) -> PointStruct {
        let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        payload.insert(PAYLOAD_KEY_TEXT.to_string(), segment.text.clone().into());
        for (key, value) in segment.metadata.iter() {
            payload.insert(payload_key(key), to_payload_value(value));
        }
        PointStruct::new(id.to_string(), embedding, payload)
    }

    fn scored_point_to_match(&self, point: &ScoredPoint) -> EmbeddingMatch {
        let mut text = String::new();
        let mut metadata = Metadata::new();
        for (key, val) in &point.payload {
            if key == PAYLOAD_KEY_TEXT {
                if let Some(MetadataValue::Str(s)) = from_payload_value(val) {
                    text = s;
                }
            } else if let Some(meta_key) = key.strip_prefix(PAYLOAD_KEY_METADATA_PREFIX) {
                if let Some(value) = from_payload_value(val) {
                    metadata.insert(meta_key, value);
                }
            }
        }

        let id = point
            .id
            .as_ref()
            .and_then(|id| id.point_id_options.as_ref())
            .map(|options| match options {
                qdrant_client::qdrant::point_id::PointIdOptions::Uuid(s) => s.clone(),
                qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => n.to_string(),
            })
            .unwrap_or_default();

        let raw = f64::from(point.score);
        let score = match self.metric {
            SimilarityMetric::Cosine => relevance_from_cosine(raw),
            _ => raw,
        };

        EmbeddingMatch {
            id,
            score,
            segment: TextSegment { text, metadata },
        }
    }
}

#[async_trait]
impl EmbeddingStore for QdrantEmbeddingStore {
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
        if segments.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = segments.iter().map(|_| Uuid::new_v4().to_string()).collect();
        let points: Vec<PointStruct> = embeddings
            .into_iter()
            .zip(&segments)
            .zip(&ids)
            .map(|((embedding, segment), id)| Self::segment_to_point(id, embedding, segment))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points).wait(true))
            .await
            .map_err(|e| RagError::Store(format!("Qdrant upsert failed: {e}")))?;
        Ok(ids)
    }

    async fn search(&self, request: &EmbeddingSearchRequest) -> RagResult<Vec<EmbeddingMatch>> {
        let mut query = QueryPointsBuilder::new(&self.collection_name)
            .query(request.query_embedding.clone())
            .limit(request.max_results as u64)
            .with_payload(true);
        if let Some(filter) = &request.filter {
            query = query.filter(QdrantFilter::must([to_qdrant_condition(filter)?]));
        }

        let response = self
            .client
            .query(query)
            .await
            .map_err(|e| RagError::Store(format!("Qdrant search failed: {e}")))?;

        let mut matches: Vec<EmbeddingMatch> = response
            .result
            .iter()
            .map(|point| self.scored_point_to_match(point))
            .filter(|m| m.score >= request.min_score)
            .collect();
        matches.truncate(request.max_results);
        Ok(matches)
    }

    async fn remove_all(&self) -> RagResult<()> {
        // Delete and recreate the collection to clear all points.
        let _ = self.client.delete_collection(&self.collection_name).await;
        self.ensure_collection_exists().await
    }
}
