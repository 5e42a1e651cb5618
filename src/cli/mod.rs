//! Command-line interface for indexing, search and context retrieval.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Chunk, embed and retrieve documents for retrieval-augmented generation.
#[derive(Debug, Parser)]
#[command(name = "docrag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check the embedding service and vector store
    Status,

    /// Manage the document index (add, delete, list, clear)
    #[command(subcommand)]
    Index(commands::IndexCommand),

    /// Search indexed chunks by similarity
    Search(commands::SearchArgs),

    /// Assemble a cited context bundle for a query
    Context(commands::ContextArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
