//! Content aggregators

pub mod fusion;
pub mod reranking;

pub use fusion::{DEFAULT_RRF_K, ReciprocalRankFusionAggregator};
pub use reranking::ReRankingContentAggregator;

use async_trait::async_trait;
use ragweave_kernel::error::RagResult;
use ragweave_kernel::rag::{ContentAggregator, Query, ScoredContent};
use std::cmp::Ordering;

/// Concatenates, drops duplicates and orders by descending score.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContentAggregator;

/// Flattens the lists keeping the first occurrence of each content. A
/// duplicate found later lifts the kept score when it scored higher.
pub(crate) fn deduplicate(results: Vec<Vec<ScoredContent>>) -> Vec<ScoredContent> {
    let mut unique: Vec<ScoredContent> = Vec::new();
    for content in results.into_iter().flatten() {
        match unique.iter_mut().find(|kept| kept.same_content(&content)) {
            Some(kept) => kept.score = kept.score.max(content.score),
            None => unique.push(content),
        }
    }
    unique
}

pub(crate) fn by_score_desc(a: &ScoredContent, b: &ScoredContent) -> Ordering {
    b.score.total_cmp(&a.score)
}

#[async_trait]
impl ContentAggregator for DefaultContentAggregator {
    async fn aggregate(
        &self,
        _query: &Query,
        results: Vec<Vec<ScoredContent>>,
    ) -> RagResult<Vec<ScoredContent>> {
        let mut contents = deduplicate(results);
        contents.sort_by(by_score_desc);
        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_kept_once() {
        let item =
            ScoredContent::new("Reservations can be cancelled.", 0.8).with_metadata("index", 0);
        let other = ScoredContent::new("Vehicles must be returned clean.", 0.7);
        let out = DefaultContentAggregator
            .aggregate(
                &Query::new("q"),
                vec![vec![item.clone(), other.clone()], vec![item.clone().with_score(0.9)]],
            )
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, item.text);
        assert_eq!(out[0].score, 0.9);
        assert_eq!(out[1], other);
    }

    #[tokio::test]
    async fn test_same_text_other_metadata_is_distinct() {
        let a = ScoredContent::new("same", 0.5).with_metadata("file_name", "a.txt");
        let b = ScoredContent::new("same", 0.5).with_metadata("file_name", "b.txt");
        let out = DefaultContentAggregator
            .aggregate(&Query::new("q"), vec![vec![a.clone()], vec![b.clone()]])
            .await
            .unwrap();
        assert_eq!(out, vec![a, b]);
    }
}
