//! `example <variant>`: RAG recipes over the documents directory
//!
//! Every recipe ingests its documents into an in-memory store, assembles a
//! retrieval augmentor and asks a short list of questions. With `--no-chat`
//! the augmented prompt and its sources are printed instead of an answer,
//! and stages that depend on the chat model fall back to their defaults.

use crate::CliError;
use crate::cli::ExampleVariant;
use crate::context::CliContext;
use crate::output;
use ragweave_foundation::aggregator::ReRankingContentAggregator;
use ragweave_foundation::injector::DefaultContentInjector;
use ragweave_foundation::memory::ChatMemoryStore;
use ragweave_foundation::rag::loaders::FILE_NAME_KEY;
use ragweave_foundation::rag::splitter::SEGMENT_INDEX_KEY;
use ragweave_foundation::rag::{
    EmbeddingStoreIngestor, InMemoryEmbeddingStore, RecursiveDocumentSplitter,
};
use ragweave_foundation::router::FallbackStrategy;
use ragweave_foundation::{
    Assistant, CompressingQueryTransformer, DefaultQueryRouter, EmbeddingStoreContentRetriever,
    LanguageModelQueryRouter, LanguageModelSqlFilterBuilder, RelevanceGatedQueryRouter,
    RetrievalAugmentorBuilder, TableDefinition, WebSearchContentRetriever,
};
use ragweave_kernel::rag::{
    ChatModel, ContentRetriever, Document, EmbeddingModel, Filter, Query, QueryRouter,
    RetrievalAugmentor, RetrieverDescriptor, TextSegment,
};
use std::sync::Arc;
use tracing::{info, warn};

pub const TERMS_OF_USE: &str = "miles-of-smiles-terms-of-use.txt";
pub const BIOGRAPHY: &str = "biography-of-john-doe.txt";

const SKIP_RETRIEVAL_PROMPT: &str = "Is the following query related to the business of the car \
rental company? Answer only 'yes', 'no' or 'maybe'. Query: {{it}}";
const SKIP_RETRIEVAL_TEMPERATURE: f32 = 0.4;

/// One question, optionally asked inside a named session.
#[derive(Debug, Clone, PartialEq)]
struct Turn {
    session: Option<String>,
    text: String,
}

impl Turn {
    fn new(text: impl Into<String>) -> Self {
        Self {
            session: None,
            text: text.into(),
        }
    }

    fn in_session(session: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session: Some(session.into()),
            text: text.into(),
        }
    }

    fn query(&self) -> Query {
        let query = Query::new(&self.text);
        match &self.session {
            Some(session) => query.with_session(session),
            None => query,
        }
    }
}

fn turns(questions: &[&str]) -> Vec<Turn> {
    questions.iter().map(|q| Turn::new(*q)).collect()
}

struct Scenario {
    title: String,
    augmentor: RetrievalAugmentor,
    /// Chat memory window; `None` answers every turn without history.
    memory: Option<usize>,
    turns: Vec<Turn>,
    show_sources: bool,
}

impl Scenario {
    fn new(title: impl Into<String>, augmentor: RetrievalAugmentor, turns: Vec<Turn>) -> Self {
        Self {
            title: title.into(),
            augmentor,
            memory: None,
            turns,
            show_sources: false,
        }
    }

    fn with_memory(mut self, max_messages: usize) -> Self {
        self.memory = Some(max_messages);
        self
    }

    fn with_sources(mut self) -> Self {
        self.show_sources = true;
        self
    }
}

pub async fn run(
    ctx: &CliContext,
    variant: ExampleVariant,
    questions: &[String],
    no_chat: bool,
) -> Result<(), CliError> {
    let chat = if no_chat {
        None
    } else {
        let temperature = match variant {
            ExampleVariant::SkipRetrieval => Some(SKIP_RETRIEVAL_TEMPERATURE),
            _ => ctx.config.chat_temperature,
        };
        Some(ctx.chat_model_with_temperature(temperature)?)
    };

    let recipes = Recipes {
        ctx,
        embedding_model: ctx.embedding_model()?,
        chat: chat.clone(),
    };
    let scenarios = recipes.build(variant).await?;

    for mut scenario in scenarios {
        if !questions.is_empty() {
            scenario.turns = questions.iter().map(Turn::new).collect();
        }
        play(scenario, chat.as_ref()).await?;
    }
    Ok(())
}

async fn play(scenario: Scenario, chat: Option<&Arc<dyn ChatModel>>) -> Result<(), CliError> {
    output::heading(&scenario.title);

    let Some(chat) = chat else {
        for turn in &scenario.turns {
            let result = scenario.augmentor.run(&turn.query(), None).await?;
            output::question(&turn.text);
            output::augmented_prompt(&result.augmented_prompt);
            output::sources(&result.sources);
        }
        return Ok(());
    };

    let mut assistant = Assistant::new(Arc::clone(chat)).with_augmentor(scenario.augmentor);
    if let Some(max_messages) = scenario.memory {
        assistant = assistant.with_memory(Arc::new(ChatMemoryStore::new(max_messages)));
    }
    for turn in &scenario.turns {
        let answer = assistant.answer(&turn.query()).await?;
        info!("Question: {}", turn.text);
        info!("Answer: {}", answer.text);
        output::question(&turn.text);
        output::answer(&answer.text);
        if scenario.show_sources {
            output::sources(&answer.sources);
        }
    }
    Ok(())
}

/// Shared inputs of the recipes.
struct Recipes<'a> {
    ctx: &'a CliContext,
    embedding_model: Arc<dyn EmbeddingModel>,
    chat: Option<Arc<dyn ChatModel>>,
}

impl Recipes<'_> {
    async fn build(&self, variant: ExampleVariant) -> Result<Vec<Scenario>, CliError> {
        let scenarios = match variant {
            ExampleVariant::Easy => vec![self.easy().await?],
            ExampleVariant::Naive => vec![self.naive().await?],
            ExampleVariant::Metadata => vec![self.metadata().await?],
            ExampleVariant::MetadataFiltering => self.metadata_filtering().await?,
            ExampleVariant::MultipleRetrievers => vec![self.multiple_retrievers().await?],
            ExampleVariant::QueryCompression => vec![self.query_compression().await?],
            ExampleVariant::QueryRouting => vec![self.query_routing().await?],
            ExampleVariant::Reranking => vec![self.reranking().await?],
            ExampleVariant::ReturnSources => vec![self.return_sources().await?],
            ExampleVariant::SkipRetrieval => vec![self.skip_retrieval().await?],
            ExampleVariant::WebSearch => vec![self.web_search().await?],
        };
        Ok(scenarios)
    }

    fn builder(&self) -> RetrievalAugmentorBuilder {
        RetrievalAugmentorBuilder::new().retriever_timeout(self.ctx.config.retriever_timeout())
    }

    async fn store_of(
        &self,
        documents: &[Document],
        splitter: Option<RecursiveDocumentSplitter>,
    ) -> Result<Arc<InMemoryEmbeddingStore>, CliError> {
        let store = Arc::new(InMemoryEmbeddingStore::new());
        let mut ingestor = EmbeddingStoreIngestor::new(self.embedding_model.clone(), store.clone());
        if let Some(splitter) = splitter {
            ingestor = ingestor.with_splitter(splitter);
        }
        ingestor.ingest(documents).await?;
        Ok(store)
    }

    async fn store_of_segments(
        &self,
        segments: Vec<TextSegment>,
    ) -> Result<Arc<InMemoryEmbeddingStore>, CliError> {
        let store = Arc::new(InMemoryEmbeddingStore::new());
        EmbeddingStoreIngestor::new(self.embedding_model.clone(), store.clone())
            .ingest_segments(segments)
            .await?;
        Ok(store)
    }

    /// A thresholded retriever over one split document.
    async fn document_retriever(
        &self,
        file_name: &str,
        name: &str,
        max_results: usize,
        min_score: f64,
    ) -> Result<EmbeddingStoreContentRetriever, CliError> {
        let document = self.ctx.document(file_name)?;
        let store = self
            .store_of(&[document], Some(RecursiveDocumentSplitter::new(300, 0)))
            .await?;
        Ok(
            EmbeddingStoreContentRetriever::new(store, self.embedding_model.clone())
                .with_name(name)
                .with_max_results(max_results)
                .with_min_score(min_score),
        )
    }

    fn chat_or_warn(&self, stage: &str) -> Option<Arc<dyn ChatModel>> {
        if self.chat.is_none() {
            warn!(stage, "no chat model, using the default stage");
        }
        self.chat.clone()
    }

    async fn easy(&self) -> Result<Scenario, CliError> {
        let documents = self.ctx.documents()?;
        let store = self.store_of(&documents, None).await?;
        let retriever = EmbeddingStoreContentRetriever::new(store, self.embedding_model.clone());
        let augmentor = self.builder().content_retriever(Arc::new(retriever)).build();
        Ok(Scenario::new(
            "Easy RAG",
            augmentor,
            turns(&[
                "Can I cancel my reservation?",
                "I had an accident, should I pay extra?",
            ]),
        )
        .with_memory(10))
    }

    async fn naive(&self) -> Result<Scenario, CliError> {
        let retriever = self.document_retriever(TERMS_OF_USE, "terms", 2, 0.5).await?;
        let augmentor = self.builder().content_retriever(Arc::new(retriever)).build();
        Ok(Scenario::new(
            "Naive RAG",
            augmentor,
            turns(&[
                "Can I cancel my reservation?",
                "I had an accident, should I pay extra?",
            ]),
        )
        .with_memory(2))
    }

    async fn metadata(&self) -> Result<Scenario, CliError> {
        let retriever = self.document_retriever(TERMS_OF_USE, "terms", 2, 0.5).await?;
        let injector =
            DefaultContentInjector::new().with_metadata_keys([FILE_NAME_KEY, SEGMENT_INDEX_KEY]);
        let augmentor = self
            .builder()
            .content_retriever(Arc::new(retriever))
            .content_injector(Arc::new(injector))
            .build();
        Ok(Scenario::new(
            "Metadata in the prompt",
            augmentor,
            turns(&["What is the name of the file where cancellation policy is defined?"]),
        )
        .with_memory(10))
    }

    async fn metadata_filtering(&self) -> Result<Vec<Scenario>, CliError> {
        // Fixed filter.
        let animals = self
            .store_of_segments(vec![
                TextSegment::new("Article about dogs ...").with_metadata("animal", "dog"),
                TextSegment::new("Article about birds ...").with_metadata("animal", "bird"),
            ])
            .await?;
        let retriever = EmbeddingStoreContentRetriever::new(animals, self.embedding_model.clone())
            .with_name("animals")
            .with_filter(Filter::eq("animal", "dog"));
        let static_filter = Scenario::new(
            "Static metadata filter (animal = dog)",
            self.builder().content_retriever(Arc::new(retriever)).build(),
            turns(&["Which animal?"]),
        )
        .with_sources();

        // Filter computed from the session of each query.
        let colors = self
            .store_of_segments(vec![
                TextSegment::new("My favorite color is green").with_metadata("userId", "1"),
                TextSegment::new("My favorite color is red").with_metadata("userId", "2"),
            ])
            .await?;
        let by_user = |query: &Query| query.session_id().map(|id| Filter::eq("userId", id));
        let retriever = EmbeddingStoreContentRetriever::new(colors, self.embedding_model.clone())
            .with_name("preferences")
            .with_dynamic_filter(Arc::new(by_user));
        let dynamic_filter = Scenario::new(
            "Dynamic metadata filter (userId = session)",
            self.builder().content_retriever(Arc::new(retriever)).build(),
            vec![
                Turn::in_session("1", "Which color would be best for a dress?"),
                Turn::in_session("2", "Which color would be best for a suit?"),
            ],
        )
        .with_memory(5)
        .with_sources();

        // Filter written by the chat model.
        let movies = self
            .store_of_segments(vec![
                TextSegment::new("Forrest Gump")
                    .with_metadata("genre", "drama")
                    .with_metadata("year", 1994),
                TextSegment::new("Groundhog Day")
                    .with_metadata("genre", "comedy")
                    .with_metadata("year", 1993),
                TextSegment::new("Die Hard")
                    .with_metadata("genre", "action")
                    .with_metadata("year", 1998),
            ])
            .await?;
        let mut retriever =
            EmbeddingStoreContentRetriever::new(movies, self.embedding_model.clone())
                .with_name("movies");
        if let Some(chat) = self.chat_or_warn("sql filter") {
            let table = TableDefinition::new("movies")
                .described_column("genre", "VARCHAR", "one of: [comedy, drama, action]")
                .column("year", "INT");
            retriever = retriever
                .with_dynamic_filter(Arc::new(LanguageModelSqlFilterBuilder::new(chat, table)));
        }
        let generated_filter = Scenario::new(
            "Filter generated from the question",
            self.builder().content_retriever(Arc::new(retriever)).build(),
            turns(&["Recommend a good action movie from the 90s."]),
        )
        .with_sources();

        Ok(vec![static_filter, dynamic_filter, generated_filter])
    }

    async fn two_retrievers(
        &self,
    ) -> Result<(Arc<dyn ContentRetriever>, Arc<dyn ContentRetriever>), CliError> {
        let biography = self.document_retriever(BIOGRAPHY, "biography", 2, 0.6).await?;
        let terms = self.document_retriever(TERMS_OF_USE, "terms", 2, 0.6).await?;
        Ok((Arc::new(biography), Arc::new(terms)))
    }

    async fn multiple_retrievers(&self) -> Result<Scenario, CliError> {
        let (biography, terms) = self.two_retrievers().await?;
        let augmentor = self
            .builder()
            .query_router(Arc::new(DefaultQueryRouter::new(vec![biography, terms])))
            .build();
        Ok(Scenario::new(
            "Multiple retrievers",
            augmentor,
            turns(&[
                "What did John Doe do in his spare time?",
                "How do I book my reservation?",
            ]),
        )
        .with_memory(10))
    }

    async fn query_compression(&self) -> Result<Scenario, CliError> {
        let retriever = self.document_retriever(BIOGRAPHY, "biography", 2, 0.5).await?;
        let mut builder = self.builder().content_retriever(Arc::new(retriever));
        if let Some(chat) = self.chat_or_warn("query compression") {
            builder = builder.query_transformer(Arc::new(CompressingQueryTransformer::new(chat)));
        }
        Ok(Scenario::new(
            "Query compression",
            builder.build(),
            turns(&[
                "What is the legacy of John Doe?",
                "When was he born?",
                "How old is he?",
            ]),
        )
        .with_memory(2))
    }

    async fn query_routing(&self) -> Result<Scenario, CliError> {
        let (biography, terms) = self.two_retrievers().await?;
        let router: Arc<dyn QueryRouter> =
            match self.chat_or_warn("query routing") {
                Some(chat) => Arc::new(
                    LanguageModelQueryRouter::new(
                        chat,
                        vec![
                            RetrieverDescriptor::new(biography, "biography of John Doe"),
                            RetrieverDescriptor::new(terms, "terms of use of car rental company"),
                        ],
                    )
                    .with_fallback(FallbackStrategy::DoNotRoute),
                ),
                None => Arc::new(DefaultQueryRouter::new(vec![biography, terms])),
            };
        Ok(Scenario::new(
            "Query routing",
            self.builder().query_router(router).build(),
            turns(&[
                "What is the legacy of John Doe?",
                "Can I cancel my reservation?",
            ]),
        )
        .with_memory(10))
    }

    async fn reranking(&self) -> Result<Scenario, CliError> {
        let scoring_model = self.ctx.scoring_model()?;
        let retriever = self.document_retriever(TERMS_OF_USE, "terms", 5, 0.0).await?;
        let aggregator = ReRankingContentAggregator::new(scoring_model).with_min_score(0.8);
        let augmentor = self
            .builder()
            .content_retriever(Arc::new(retriever))
            .content_aggregator(Arc::new(aggregator))
            .build();
        Ok(Scenario::new(
            "Re-ranking",
            augmentor,
            turns(&["Hello!", "Can I cancel my reservation?"]),
        )
        .with_memory(10)
        .with_sources())
    }

    async fn return_sources(&self) -> Result<Scenario, CliError> {
        let retriever = self.document_retriever(TERMS_OF_USE, "terms", 2, 0.6).await?;
        let augmentor = self.builder().content_retriever(Arc::new(retriever)).build();
        Ok(Scenario::new(
            "Answers with their sources",
            augmentor,
            turns(&[
                "Can I use the car to smuggle drugs?",
                "How do I book my reservation?",
            ]),
        )
        .with_memory(10)
        .with_sources())
    }

    async fn skip_retrieval(&self) -> Result<Scenario, CliError> {
        let retriever: Arc<dyn ContentRetriever> =
            Arc::new(self.document_retriever(TERMS_OF_USE, "terms", 2, 0.6).await?);
        let router: Arc<dyn QueryRouter> =
            match self.chat_or_warn("relevance gate") {
                Some(chat) => Arc::new(RelevanceGatedQueryRouter::new(
                    chat,
                    SKIP_RETRIEVAL_PROMPT,
                    vec![retriever],
                )),
                None => Arc::new(DefaultQueryRouter::single(retriever)),
            };
        Ok(Scenario::new(
            "Skipping retrieval for unrelated questions",
            self.builder().query_router(router).build(),
            turns(&["The dog is black", "Can I cancel my reservation?"]),
        )
        .with_memory(10)
        .with_sources())
    }

    async fn web_search(&self) -> Result<Scenario, CliError> {
        let engine = self.ctx.web_search_engine()?;
        let terms: Arc<dyn ContentRetriever> =
            Arc::new(self.document_retriever(TERMS_OF_USE, "terms", 2, 0.6).await?);
        let web: Arc<dyn ContentRetriever> =
            Arc::new(WebSearchContentRetriever::new(engine).with_max_results(3));
        let augmentor = self
            .builder()
            .query_router(Arc::new(DefaultQueryRouter::new(vec![terms, web])))
            .build();
        Ok(Scenario::new(
            "Documents plus web search",
            augmentor,
            turns(&["What are the terms of use for the Miles of Smiles app?"]),
        )
        .with_memory(10)
        .with_sources())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use ragweave_foundation::HashingEmbeddingModel;

    fn recipes(ctx: &CliContext) -> Recipes<'_> {
        Recipes {
            ctx,
            embedding_model: Arc::new(HashingEmbeddingModel::new(384)),
            chat: None,
        }
    }

    #[test]
    fn test_turn_carries_session() {
        let query = Turn::in_session("2", "Which color?").query();
        assert_eq!(query.session_id(), Some("2"));
        assert_eq!(Turn::new("Hi").query().session_id(), None);
    }

    #[tokio::test]
    async fn test_metadata_filtering_scenarios_without_chat() {
        let ctx = CliContext::new(AppConfig::default());
        let scenarios = recipes(&ctx).metadata_filtering().await.unwrap();
        assert_eq!(scenarios.len(), 3);

        let static_filter = &scenarios[0];
        let result = static_filter
            .augmentor
            .run(&static_filter.turns[0].query(), None)
            .await
            .unwrap();
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].metadata.get_str("animal"), Some("dog"));

        let dynamic_filter = &scenarios[1];
        let result = dynamic_filter
            .augmentor
            .run(&dynamic_filter.turns[1].query(), None)
            .await
            .unwrap();
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].text, "My favorite color is red");
    }

    #[tokio::test]
    async fn test_reranking_requires_cohere_key() {
        let ctx = CliContext::new(AppConfig::default());
        let err = recipes(&ctx).reranking().await.err().unwrap();
        assert!(err.to_string().contains("cohere_api_key_file"));
    }

    fn documents_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(TERMS_OF_USE),
            "Reservations can be cancelled up to 7 days before the rental for a full refund.",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(BIOGRAPHY),
            "John Doe was born in 1950. His legacy is a foundation for young engineers.",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_short_memory_recipes() {
        let dir = documents_dir();
        let ctx = CliContext::new(AppConfig {
            documents_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        });
        let recipes = recipes(&ctx);

        assert_eq!(recipes.naive().await.unwrap().memory, Some(2));
        assert_eq!(recipes.query_compression().await.unwrap().memory, Some(2));

        let sources = recipes.return_sources().await.unwrap();
        assert!(sources.show_sources);
        assert_eq!(sources.memory, Some(10));
        let result = sources
            .augmentor
            .run(&sources.turns[1].query(), None)
            .await
            .unwrap();
        assert!(result.sources.len() <= 2);
    }
}
