//! ragweave CLI - retrieval-augmented generation from the command line

mod cli;
mod commands;
mod config;
mod context;
mod error;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use context::CliContext;
use tracing_subscriber::EnvFilter;

pub use error::CliError;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command_async(cli))
}

async fn run_command_async(cli: Cli) -> anyhow::Result<()> {
    let app_config = config::AppConfig::load(cli.config.as_deref())?;
    app_config.log_summary();
    let ctx = CliContext::new(app_config);

    match cli.command {
        Commands::Load => {
            commands::index::load(&ctx).await?;
        }

        Commands::Query {
            question,
            max_results,
        } => {
            commands::index::query(&ctx, question.as_deref(), max_results).await?;
        }

        Commands::Delete => {
            commands::index::delete(&ctx).await?;
        }

        Commands::Rag { question, session } => {
            commands::rag::run(&ctx, question.as_deref(), session.as_deref(), false).await?;
        }

        Commands::HybridQuery { question, session } => {
            commands::rag::run(&ctx, question.as_deref(), session.as_deref(), true).await?;
        }

        Commands::StructuredOutput { text } => {
            commands::structured::run(&ctx, text.as_deref()).await?;
        }

        Commands::Example {
            variant,
            questions,
            no_chat,
        } => {
            commands::example::run(&ctx, variant, &questions, no_chat).await?;
        }
    }

    Ok(())
}
