//! Scoring by embedding similarity
//!
//! Embeds the query and the candidates with the same model and scores each
//! candidate by cosine relevance in [0, 1]. Works offline when paired with
//! the hashing model.

use crate::rag::similarity::{cosine_similarity, relevance_from_cosine};
use async_trait::async_trait;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{EmbeddingModel, ScoringModel};
use std::sync::Arc;

pub struct EmbeddingSimilarityScoringModel {
    embedding_model: Arc<dyn EmbeddingModel>,
}

impl EmbeddingSimilarityScoringModel {
    pub fn new(embedding_model: Arc<dyn EmbeddingModel>) -> Self {
        Self { embedding_model }
    }
}

#[async_trait]
impl ScoringModel for EmbeddingSimilarityScoringModel {
    fn model_name(&self) -> &str {
        self.embedding_model.model_name()
    }

    async fn score_all(&self, query: &str, candidates: &[String]) -> RagResult<Vec<f64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedding_model.embed(query).await?;
        let vectors = self.embedding_model.embed_all(candidates).await?;
        if vectors.len() != candidates.len() {
            return Err(RagError::Embedding(format!(
                "{} vectors for {} candidates",
                vectors.len(),
                candidates.len()
            )));
        }
        Ok(vectors
            .iter()
            .map(|v| relevance_from_cosine(cosine_similarity(&query_vector, v)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingModel;

    #[tokio::test]
    async fn test_related_candidate_scores_higher() {
        let scorer =
            EmbeddingSimilarityScoringModel::new(Arc::new(HashingEmbeddingModel::new(256)));
        let scores = scorer
            .score_all(
                "cancel my reservation",
                &[
                    "John Doe grew up in a small town.".to_string(),
                    "You may cancel a reservation free of charge.".to_string(),
                ],
            )
            .await
            .unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[1] > scores[0]);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }
}
