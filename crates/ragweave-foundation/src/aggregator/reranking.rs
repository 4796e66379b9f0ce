//! Reranking with a dedicated scoring model

use super::deduplicate;
use async_trait::async_trait;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{ContentAggregator, Query, ScoredContent, ScoringModel};
use std::sync::Arc;
use tracing::debug;

/// Re-scores the union of candidates against the query text.
///
/// Reranked scores replace the retriever scores. Items below `min_score`
/// are dropped; without a minimum the candidates are only reordered. Equal
/// scores are ordered by text so that reranking an already reranked list
/// keeps its order.
pub struct ReRankingContentAggregator {
    scoring_model: Arc<dyn ScoringModel>,
    min_score: Option<f64>,
    max_results: Option<usize>,
}

impl ReRankingContentAggregator {
    pub fn new(scoring_model: Arc<dyn ScoringModel>) -> Self {
        Self {
            scoring_model,
            min_score: None,
            max_results: None,
        }
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

#[async_trait]
impl ContentAggregator for ReRankingContentAggregator {
    async fn aggregate(
        &self,
        query: &Query,
        results: Vec<Vec<ScoredContent>>,
    ) -> RagResult<Vec<ScoredContent>> {
        let candidates = deduplicate(results);
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let scores = self.scoring_model.score_all(query.text(), &texts).await?;
        if scores.len() != candidates.len() {
            return Err(RagError::Generation(format!(
                "{} returned {} scores for {} candidates",
                self.scoring_model.model_name(),
                scores.len(),
                candidates.len()
            )));
        }

        let before = candidates.len();
        let mut reranked: Vec<ScoredContent> = candidates
            .into_iter()
            .zip(scores)
            .map(|(content, score)| content.with_score(score))
            .filter(|content| self.min_score.is_none_or(|min| content.score >= min))
            .collect();
        reranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.text.cmp(&b.text)));
        if let Some(max) = self.max_results {
            reranked.truncate(max);
        }

        debug!(
            model = %self.scoring_model.model_name(),
            candidates = before,
            kept = reranked.len(),
            "reranked"
        );
        Ok(reranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scores by the share of query words found in the candidate.
    struct Overlap;

    #[async_trait]
    impl ScoringModel for Overlap {
        fn model_name(&self) -> &str {
            "overlap"
        }

        async fn score_all(&self, query: &str, candidates: &[String]) -> RagResult<Vec<f64>> {
            let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
            Ok(candidates
                .iter()
                .map(|c| {
                    let c = c.to_lowercase();
                    words.iter().filter(|w| c.contains(w.as_str())).count() as f64
                        / words.len() as f64
                })
                .collect())
        }
    }

    struct Down;

    #[async_trait]
    impl ScoringModel for Down {
        fn model_name(&self) -> &str {
            "down"
        }

        async fn score_all(&self, _: &str, _: &[String]) -> RagResult<Vec<f64>> {
            Err(RagError::Generation("rerank service unavailable".into()))
        }
    }

    fn candidates() -> Vec<Vec<ScoredContent>> {
        vec![
            vec![
                ScoredContent::new("Drivers must be 21 years old.", 0.9),
                ScoredContent::new("You can cancel a reservation up to 24 hours before.", 0.5),
            ],
            vec![ScoredContent::new("Cancel anytime.", 0.7)],
        ]
    }

    #[tokio::test]
    async fn test_reorders_by_new_scores() {
        let aggregator = ReRankingContentAggregator::new(Arc::new(Overlap));
        let query = Query::new("cancel reservation");
        let out = aggregator.aggregate(&query, candidates()).await.unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].text, "You can cancel a reservation up to 24 hours before.");
        assert_eq!(out[0].score, 1.0);
        assert_eq!(out[2].score, 0.0);
    }

    #[tokio::test]
    async fn test_min_score_and_max_results() {
        let query = Query::new("cancel reservation");
        let out = ReRankingContentAggregator::new(Arc::new(Overlap))
            .with_min_score(0.5)
            .aggregate(&query, candidates())
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.score >= 0.5));

        let out = ReRankingContentAggregator::new(Arc::new(Overlap))
            .with_max_results(1)
            .aggregate(&query, candidates())
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_reranking_is_idempotent() {
        let aggregator = ReRankingContentAggregator::new(Arc::new(Overlap));
        let query = Query::new("cancel reservation");
        let first = aggregator.aggregate(&query, candidates()).await.unwrap();
        let second = aggregator.aggregate(&query, vec![first.clone()]).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_scoring_failure_is_surfaced() {
        let err = ReRankingContentAggregator::new(Arc::new(Down))
            .aggregate(&Query::new("q"), candidates())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RagError::Generation(_)));
    }
}
