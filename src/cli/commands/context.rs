use anyhow::{Context, Result};
use clap::Args;

use super::{open_embedder, open_store};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::RetrievalService;

#[derive(Debug, Args)]
pub struct ContextArgs {
    #[arg(required = true, help = "Question or topic to gather context for")]
    pub query: String,

    #[arg(long, short = 'c', help = "Maximum number of chunks to include")]
    pub max_chunks: Option<usize>,

    #[arg(long, help = "Minimum similarity for a chunk to be included")]
    pub threshold: Option<f32>,
}

pub async fn handle_context(args: ContextArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    if args.max_chunks == Some(0) {
        anyhow::bail!("max-chunks must be at least 1");
    }

    let config = Config::load()?.config;
    let formatter = get_formatter(format);

    let embedder = open_embedder(&config)?;
    let store = open_store(&config).await?;
    let service = RetrievalService::new(embedder, store, config.retrieval.clone());

    let bundle = service
        .get_context(&args.query, args.max_chunks, args.threshold)
        .await
        .context("context retrieval failed")?;

    if verbose {
        eprintln!(
            "Context: {} chunk(s) from {} source(s), threshold {}",
            bundle.match_count,
            bundle.sources.len(),
            bundle.threshold
        );
    }

    print!("{}", formatter.format_context(&bundle));

    Ok(())
}
