//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// ragweave - retrieval-augmented generation over Pinecone, Qdrant and local stores
#[derive(Parser)]
#[command(name = "ragweave")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (yaml, toml, json, ini, ron, json5)
    #[arg(short = 'c', long, global = true, env = "RAGWEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Embed the records (file or MongoDB) into the index, creating it if missing
    Load,

    /// Search the index and print matches with their scores
    Query {
        /// Question to search for (defaults to `query_text`)
        #[arg(short, long)]
        question: Option<String>,

        /// Number of matches to return
        #[arg(short = 'n', long, default_value_t = 10)]
        max_results: usize,
    },

    /// Remove every vector from the configured namespace
    Delete,

    /// Answer a question from the index with reranking and chat memory
    Rag {
        /// Question to answer (defaults to `query_text`)
        #[arg(short, long)]
        question: Option<String>,

        /// Chat memory session id
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Like `rag`, restricted to the science categories of the index
    HybridQuery {
        /// Question to answer (defaults to `query_text`)
        #[arg(short, long)]
        question: Option<String>,

        /// Chat memory session id
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Extract a person record from free text through a JSON schema
    StructuredOutput {
        /// Text describing the person (a built-in passage when omitted)
        #[arg(short, long)]
        text: Option<String>,
    },

    /// Run one of the RAG recipes over the documents directory
    Example {
        /// Recipe to run
        #[arg(value_enum)]
        variant: ExampleVariant,

        /// Question to ask; repeat for a conversation (replaces the recipe's own questions)
        #[arg(short, long = "question")]
        questions: Vec<String>,

        /// Print the augmented prompt and sources instead of calling the chat model
        #[arg(long)]
        no_chat: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExampleVariant {
    /// Whole documents, default retrieval
    Easy,
    /// Split documents, thresholded retrieval
    Naive,
    /// Inject file name and segment index with each item
    Metadata,
    /// Static, per-user and model-generated filters
    MetadataFiltering,
    /// Two retrievers behind the default router
    MultipleRetrievers,
    /// Rewrite follow-up questions into standalone ones
    QueryCompression,
    /// Let the chat model pick the retriever
    QueryRouting,
    /// Rerank candidates with Cohere
    Reranking,
    /// Print the sources of every answer
    ReturnSources,
    /// Skip retrieval for unrelated questions
    SkipRetrieval,
    /// Combine the documents with Tavily web search
    WebSearch,
}
