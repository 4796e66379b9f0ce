//! `rag` and `hybrid-query`: answers grounded in the vector index

use crate::CliError;
use crate::context::CliContext;
use crate::output;
use ragweave_foundation::aggregator::ReRankingContentAggregator;
use ragweave_foundation::memory::{ChatMemoryStore, DEFAULT_MAX_MESSAGES};
use ragweave_foundation::rag::source::CATEGORY_KEY;
use ragweave_foundation::{Assistant, EmbeddingStoreContentRetriever, RetrievalAugmentorBuilder};
use ragweave_kernel::rag::{Filter, Query};
use std::sync::Arc;
use tracing::info;

const RAG_MAX_RESULTS: usize = 10;
const HYBRID_MAX_RESULTS: usize = 25;
const HYBRID_TEMPERATURE: f32 = 0.4;

/// Categories of the sample records searched by `hybrid-query`.
pub const SCIENCE_CATEGORIES: &[&str] =
    &["astronomy", "inventions", "physics", "science", "technology"];

/// OR of one equality per category.
pub fn category_filter(categories: &[&str]) -> Option<Filter> {
    categories
        .iter()
        .map(|category| Filter::eq(CATEGORY_KEY, *category))
        .reduce(Filter::or)
}

pub async fn run(
    ctx: &CliContext,
    question: Option<&str>,
    session: Option<&str>,
    hybrid: bool,
) -> Result<(), CliError> {
    let question = question.unwrap_or(&ctx.config.query_text);

    // Every key is checked before the index is contacted.
    let embedding_model = ctx.embedding_model()?;
    let scoring_model = ctx.scoring_model()?;
    let chat_model = if hybrid {
        ctx.chat_model_with_temperature(Some(HYBRID_TEMPERATURE))?
    } else {
        ctx.chat_model()?
    };
    let store = ctx.embedding_store().await?;

    let mut retriever = EmbeddingStoreContentRetriever::new(store, embedding_model)
        .with_name(&ctx.config.index_name);
    if hybrid {
        retriever = retriever.with_max_results(HYBRID_MAX_RESULTS);
        if let Some(filter) = category_filter(SCIENCE_CATEGORIES) {
            retriever = retriever.with_filter(filter);
        }
    } else {
        retriever = retriever.with_max_results(RAG_MAX_RESULTS);
    }

    let augmentor = RetrievalAugmentorBuilder::new()
        .content_retriever(Arc::new(retriever))
        .content_aggregator(Arc::new(ReRankingContentAggregator::new(scoring_model)))
        .retriever_timeout(ctx.config.retriever_timeout())
        .build();
    let assistant = Assistant::new(chat_model)
        .with_augmentor(augmentor)
        .with_memory(Arc::new(ChatMemoryStore::new(DEFAULT_MAX_MESSAGES)));

    let mut query = Query::new(question);
    if let Some(session) = session {
        query = query.with_session(session);
    }
    let answer = assistant.answer(&query).await?;

    info!("Question: {question}");
    info!("Answer: {}", answer.text);
    output::question(question);
    output::answer(&answer.text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragweave_kernel::rag::Metadata;

    #[test]
    fn test_category_filter_matches_listed_categories() {
        let filter = category_filter(SCIENCE_CATEGORIES).unwrap();
        assert!(filter.matches(&Metadata::new().with(CATEGORY_KEY, "physics")));
        assert!(filter.matches(&Metadata::new().with(CATEGORY_KEY, "astronomy")));
        assert!(!filter.matches(&Metadata::new().with(CATEGORY_KEY, "cooking")));
        assert!(!filter.matches(&Metadata::new()));
    }

    #[test]
    fn test_no_categories_means_no_filter() {
        assert!(category_filter(&[]).is_none());
    }
}
