//! Reciprocal rank fusion

use super::by_score_desc;
use async_trait::async_trait;
use ragweave_kernel::error::RagResult;
use ragweave_kernel::rag::{ContentAggregator, Query, ScoredContent};

pub const DEFAULT_RRF_K: f64 = 60.0;

/// Merges lists whose scores are not comparable by rank alone: each
/// occurrence at 1-based rank `r` contributes `1 / (k + r)`.
#[derive(Debug, Clone, Copy)]
pub struct ReciprocalRankFusionAggregator {
    k: f64,
}

impl Default for ReciprocalRankFusionAggregator {
    fn default() -> Self {
        Self { k: DEFAULT_RRF_K }
    }
}

impl ReciprocalRankFusionAggregator {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    pub fn fuse(&self, results: Vec<Vec<ScoredContent>>) -> Vec<ScoredContent> {
        let mut fused: Vec<ScoredContent> = Vec::new();
        for list in results {
            for (rank, content) in list.into_iter().enumerate() {
                let contribution = 1.0 / (self.k + rank as f64 + 1.0);
                match fused.iter_mut().find(|kept| kept.same_content(&content)) {
                    Some(kept) => kept.score += contribution,
                    None => fused.push(content.with_score(contribution)),
                }
            }
        }
        fused.sort_by(by_score_desc);
        fused
    }
}

#[async_trait]
impl ContentAggregator for ReciprocalRankFusionAggregator {
    async fn aggregate(
        &self,
        _query: &Query,
        results: Vec<Vec<ScoredContent>>,
    ) -> RagResult<Vec<ScoredContent>> {
        Ok(self.fuse(results))
    }
}
