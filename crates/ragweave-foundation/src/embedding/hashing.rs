//! Feature-hashing embedding model
//!
//! Deterministic, offline embeddings: each lower-cased word and each pair
//! of adjacent words is hashed into one of `dimension` buckets with a
//! hash-derived sign, and the vector is scaled to unit length. Texts that
//! share vocabulary land close to each other under cosine similarity.

use crate::rag::similarity::normalize;
use async_trait::async_trait;
use ragweave_kernel::error::RagResult;
use ragweave_kernel::rag::{Embedding, EmbeddingModel};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

#[derive(Debug, Clone)]
pub struct HashingEmbeddingModel {
    name: String,
    dimension: usize,
}

impl HashingEmbeddingModel {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            name: format!("hashing-{dimension}"),
            dimension,
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    /// Embeds one text synchronously.
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = Self::tokens(text);
        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingModel for HashingEmbeddingModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_all(&self, texts: &[String]) -> RagResult<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::similarity::cosine_similarity;

    #[test]
    fn test_deterministic_and_unit_length() {
        let model = HashingEmbeddingModel::new(384);
        let a = model.embed_text("Can I cancel my reservation?");
        let b = model.embed_text("can i CANCEL my reservation");
        assert_eq!(a.len(), 384);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let model = HashingEmbeddingModel::new(384);
        let query = model.embed_text("cancel reservation");
        let related =
            model.embed_text("Reservations can be cancelled. To cancel a reservation call us.");
        let unrelated = model.embed_text("John Doe was born in a small town.");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let model = HashingEmbeddingModel::new(8);
        assert!(model.embed_text("  ").iter().all(|x| *x == 0.0));
        assert_eq!(model.model_name(), "hashing-8");
    }
}
