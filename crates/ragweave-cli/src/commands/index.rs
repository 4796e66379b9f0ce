//! `load`, `query` and `delete`: maintenance of the vector index

use crate::CliError;
use crate::context::CliContext;
use crate::output;
use ragweave_foundation::rag::EmbeddingStoreIngestor;
use ragweave_kernel::rag::{EmbeddingModel, EmbeddingSearchRequest, EmbeddingStore};
use tracing::info;

/// Embeds every record of the configured source into the index.
pub async fn load(ctx: &CliContext) -> Result<(), CliError> {
    let source = ctx.record_source()?;
    let embedding_model = ctx.embedding_model()?;
    let store = ctx.embedding_store().await?;

    info!(source = source.name(), "loading records");
    let summary = EmbeddingStoreIngestor::new(embedding_model, store)
        .ingest_source(source.as_ref())
        .await?;
    output::done(&format!(
        "Added {} embeddings from {} records",
        summary.segments, summary.documents
    ));
    Ok(())
}

/// Prints the closest records with their scores.
pub async fn query(
    ctx: &CliContext,
    question: Option<&str>,
    max_results: usize,
) -> Result<(), CliError> {
    let question = question.unwrap_or(&ctx.config.query_text);
    let embedding_model = ctx.embedding_model()?;
    let store = ctx.embedding_store().await?;

    let embedding = embedding_model.embed(question).await?;
    let matches = store
        .search(&EmbeddingSearchRequest::new(embedding, max_results))
        .await?;

    output::question(question);
    for found in &matches {
        info!(score = found.score, "{} (Score: {})", found.segment.text, found.score);
        output::scored_match(&found.segment.text, found.score);
    }
    if matches.is_empty() {
        println!("No matches.");
    }
    Ok(())
}

pub async fn delete(ctx: &CliContext) -> Result<(), CliError> {
    let store = ctx.embedding_store().await?;
    store.remove_all().await?;
    output::done(&format!(
        "Removed all vectors from namespace '{}' of index '{}'",
        ctx.config.namespace, ctx.config.index_name
    ));
    Ok(())
}
