//! Index command implementation.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{confirm, open_embedder, open_store, parse_metadata_pair};
use crate::cli::output::{IndexStats, get_formatter};
use crate::models::{
    Config, Document, DocumentSource, Metadata, OutputFormat, Tag, parse_tags,
};
use crate::services::{IndexOutcome, IndexingPipeline, SourceExtractor, VectorStore};

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Path to directory or file to index
    #[arg(required_unless_present = "stdin")]
    path: Option<PathBuf>,

    /// Read the document text from stdin and index it under this name
    #[arg(long, value_name = "NAME", conflicts_with = "path")]
    stdin: Option<String>,

    /// Tags to apply to indexed documents (comma-separated, format: key:value)
    #[arg(long, short = 't')]
    tags: Option<String>,

    /// Metadata to attach to indexed documents (repeatable)
    #[arg(long, value_name = "KEY=VALUE")]
    meta: Vec<String>,

    /// File patterns to exclude (can be specified multiple times)
    #[arg(long, short = 'e')]
    exclude: Vec<String>,

    /// Show what would be indexed without actually indexing
    #[arg(long)]
    dry_run: bool,
}

impl AddArgs {
    fn metadata(&self) -> Result<Metadata> {
        self.meta.iter().map(|pair| parse_metadata_pair(pair)).collect()
    }
}

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// Add a file, a directory, or text from stdin to the index
    Add(AddArgs),

    /// Delete an indexed document by id, or every document under a path
    Delete {
        /// Document id, file path or directory path
        #[arg(required = true)]
        target: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },

    /// List indexed documents
    List,

    /// Clear all indexed documents
    Clear {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },
}

pub async fn handle_index(cmd: IndexCommand, format: OutputFormat, verbose: bool) -> Result<()> {
    match cmd {
        IndexCommand::Add(args) => handle_add(args, format, verbose).await,
        IndexCommand::Delete { target, force } => handle_delete(target, force, format).await,
        IndexCommand::List => handle_list(format).await,
        IndexCommand::Clear { force } => handle_clear(force, format, verbose).await,
    }
}

async fn handle_add(args: AddArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let mut config = Config::load()?.config;
    config.indexing.exclude_patterns.extend(args.exclude.iter().cloned());
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let tags: Vec<Tag> = match args.tags {
        Some(ref tag_str) => parse_tags(tag_str).context("failed to parse tags")?,
        None => Vec::new(),
    };
    let metadata = args.metadata()?;

    let source = match (args.path, args.stdin) {
        (_, Some(name)) => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            DocumentSource::inline(name, text)
        }
        (Some(path), None) => DocumentSource::from_path(path),
        (None, None) => anyhow::bail!("either a path or --stdin <NAME> is required"),
    };

    if args.dry_run {
        let extracted = SourceExtractor::new(&config.indexing).extract(&source)?;
        let message = format!(
            "Dry run: would index {} document(s) from {}",
            extracted.len(),
            source.describe()
        );
        print!("{}", formatter.format_message(&message));
        for item in &extracted {
            match item.document {
                Ok(ref doc) => {
                    println!("  {} ({}, {} bytes)", item.location, doc.file_type, doc.size_bytes)
                }
                Err(ref e) => println!("  {} (skipped: {})", item.location, e),
            }
        }
        return Ok(());
    }

    if verbose {
        eprintln!("Indexing {}", source.describe());
    }

    let embedder = open_embedder(&config)?;
    let store = open_store(&config).await?;
    let pipeline = IndexingPipeline::new(embedder, store, &config.indexing);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("invalid progress template")?,
    );
    pb.set_message(format!("indexing {}", source.describe()));
    pb.enable_steady_tick(Duration::from_millis(120));

    let outcomes = pipeline.index_source_with(source, &tags, &metadata).await;
    pb.finish_and_clear();

    let stats = summarize(&outcomes?, start_time.elapsed().as_millis() as u64);
    print!("{}", formatter.format_index_stats(&stats));

    if stats.documents_failed > 0 && stats.documents_indexed == 0 && stats.documents_unchanged == 0 {
        anyhow::bail!("no documents were indexed");
    }

    Ok(())
}

fn summarize(outcomes: &[IndexOutcome], duration_ms: u64) -> IndexStats {
    let mut stats = IndexStats {
        documents_found: outcomes.len() as u64,
        duration_ms,
        ..Default::default()
    };

    for outcome in outcomes {
        match outcome.result {
            Ok(ref summary) if summary.unchanged => stats.documents_unchanged += 1,
            Ok(ref summary) => {
                stats.documents_indexed += 1;
                stats.chunks_created += summary.chunk_count as u64;
            }
            Err(ref e) => {
                stats.documents_failed += 1;
                stats.failures.push((outcome.location.clone(), e.to_string()));
            }
        }
    }

    stats
}

async fn handle_delete(target: String, force: bool, format: OutputFormat) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);
    let store = open_store(&config).await?;

    let ids = resolve_targets(&target, store.as_ref()).await?;
    if ids.is_empty() {
        print!("{}", formatter.format_message("No documents to delete."));
        return Ok(());
    }

    if !confirm(
        &format!("This will delete {} indexed document(s) for '{}'. Continue?", ids.len(), target),
        force,
    )? {
        print!("{}", formatter.format_message("Cancelled."));
        return Ok(());
    }

    let embedder = open_embedder(&config)?;
    let pipeline = IndexingPipeline::new(embedder, store, &config.indexing);
    for id in &ids {
        pipeline
            .delete_document(id)
            .await
            .with_context(|| format!("failed to delete document {}", id))?;
    }

    let message = format!("Deleted {} document(s) from index", ids.len());
    print!("{}", formatter.format_message(&message));

    Ok(())
}

/// Map a delete target to document ids: a stored id, a file, or every document under a directory.
async fn resolve_targets(
    target: &str,
    store: &dyn VectorStore,
) -> Result<Vec<String>> {
    if store.get_document(target).await?.is_some() {
        return Ok(vec![target.to_string()]);
    }

    let path = Path::new(target);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let canonical = path.canonicalize().context("invalid path")?;

    if canonical.is_file() {
        let id = Document::generate_id(&format!("file:{}", canonical.display()));
        let found = store.get_document(&id).await?.is_some();
        return Ok(if found { vec![id] } else { Vec::new() });
    }

    Ok(store
        .list_documents()
        .await?
        .into_iter()
        .filter(|stored| Path::new(&stored.document.path).starts_with(&canonical))
        .map(|stored| stored.document.id)
        .collect())
}

async fn handle_list(format: OutputFormat) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);
    let store = open_store(&config).await?;

    let documents = store.list_documents().await?;
    print!("{}", formatter.format_documents(&documents));

    Ok(())
}

async fn handle_clear(force: bool, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);

    if !confirm("This will delete ALL indexed documents. Continue?", force)? {
        print!("{}", formatter.format_message("Cancelled."));
        return Ok(());
    }

    if verbose {
        eprintln!("Clearing all indexed documents...");
    }

    let store = open_store(&config).await?;
    store.clear().await?;

    print!("{}", formatter.format_message("All indexed documents have been cleared.")
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;
    use crate::models::{FileType, IndexSummary};
    use crate::services::InMemoryBackend;

    fn summary(chunks: usize, unchanged: bool) -> IndexSummary {
        let doc = Document::new("inline:x", "x", "x", FileType::Text, "x".to_string());
        IndexSummary::from_document(&doc, chunks, unchanged)
    }

    #[test]
    fn test_summarize_outcomes() {
        let outcomes = vec![
            IndexOutcome {
                location: "a".to_string(),
                result: Ok(summary(3, false)),
            },
            IndexOutcome {
                location: "b".to_string(),
                result: Ok(summary(2, true)),
            },
            IndexOutcome {
                location: "c".to_string(),
                result: Err(IndexError::FileReadError("too large".to_string())),
            },
        ];

        let stats = summarize(&outcomes, 7);
        assert_eq!(stats.documents_found, 3);
        assert_eq!(stats.documents_indexed, 1);
        assert_eq!(stats.documents_unchanged, 1);
        assert_eq!(stats.documents_failed, 1);
        assert_eq!(stats.chunks_created, 3);
        assert_eq!(stats.failures[0].0, "c");
    }

    #[test]
    fn test_add_parses_metadata_pairs() {
        use crate::cli::{Cli, Commands};
        use crate::models::MetadataValue;
        use clap::Parser;

        let cli = Cli::try_parse_from([
            "docrag", "index", "add", "./docs", "--meta", "team=ops", "--meta", "year=2024",
        ])
        .unwrap();
        let Commands::Index(IndexCommand::Add(args)) = cli.command else {
            panic!("expected index add");
        };

        let metadata = args.metadata().unwrap();
        assert_eq!(metadata.get("team"), Some(&MetadataValue::from("ops")));
        assert_eq!(metadata.get("year"), Some(&MetadataValue::Integer(2024)));

        let bad = Cli::try_parse_from(["docrag", "index", "add", "./docs", "--meta", "team"]).unwrap();
        let Commands::Index(IndexCommand::Add(args)) = bad.command else {
            panic!("expected index add");
        };
        assert!(args.metadata().is_err());
    }

    #[tokio::test]
    async fn test_resolve_targets_by_id_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "x").unwrap();
        let canonical = file.canonicalize().unwrap();

        let store = InMemoryBackend::new(2);
        let doc = Document::new(
            &format!("file:{}", canonical.display()),
            canonical.display().to_string(),
            "notes",
            FileType::Text,
            "x".to_string(),
        );
        store.upsert_chunks(&doc, Vec::new()).await.unwrap();

        assert_eq!(resolve_targets(&doc.id, &store).await.unwrap(), vec![doc.id.clone()]);
        assert_eq!(
            resolve_targets(&file.display().to_string(), &store).await.unwrap(),
            vec![doc.id.clone()]
        );
        assert_eq!(
            resolve_targets(&dir.path().display().to_string(), &store).await.unwrap(),
            vec![doc.id.clone()]
        );
        assert!(resolve_targets("missing-id", &store).await.unwrap().is_empty());
    }
}
