mod config;
mod context;
mod index;
mod search;
mod status;

pub use config::ConfigCommand;
pub use context::ContextArgs;
pub use index::{AddArgs, IndexCommand};
pub use search::SearchArgs;

pub use config::handle_config;
pub use context::handle_context;
pub use index::handle_index;
pub use search::handle_search;
pub use status::handle_status;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::models::{Config, MetadataValue, VectorDriver, VectorStoreConfig};
use crate::services::{Embedder, HttpEmbeddingClient, VectorStore, create_backend};

/// Vector store settings for CLI use: the memory driver persists to the
/// default snapshot file unless one is configured.
pub(crate) fn cli_store_config(config: &Config) -> VectorStoreConfig {
    let mut store = config.vector_store.clone();
    if store.driver == VectorDriver::Memory && store.snapshot_path.is_none() {
        store.snapshot_path = Config::default_snapshot_path();
    }
    store
}

/// Human-readable location of the configured vector store.
pub(crate) fn store_location(store: &VectorStoreConfig) -> String {
    match store.driver {
        VectorDriver::Memory => store
            .snapshot_path
            .as_ref()
            .map_or_else(|| "(in memory)".to_string(), |p| p.display().to_string()),
        VectorDriver::Postgres => store.url.clone(),
    }
}

pub(crate) fn open_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let client =
        HttpEmbeddingClient::new(&config.embedding).context("failed to create embedding client")?;
    Ok(Arc::new(client))
}

pub(crate) async fn open_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let store_config = cli_store_config(config);
    create_backend(&store_config, config.embedding.dimension as usize)
        .await
        .with_context(|| format!("failed to open vector store at {}", store_location(&store_config)))
}

/// Parse `key=value`; integers and booleans are recognised, everything else is a string.
pub(crate) fn parse_metadata_pair(pair: &str) -> Result<(String, MetadataValue)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("invalid metadata '{pair}': expected key=value"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("invalid metadata '{pair}': empty key");
    }

    let raw = raw.trim();
    let value = if let Ok(n) = raw.parse::<i64>() {
        MetadataValue::Integer(n)
    } else if let Ok(b) = raw.parse::<bool>() {
        MetadataValue::Boolean(b)
    } else {
        MetadataValue::String(raw.to_string())
    };

    Ok((key.to_string(), value))
}

/// Ask for confirmation on stdin unless `force` is set.
pub(crate) fn confirm(prompt: &str, force: bool) -> Result<bool> {
    if force {
        return Ok(true);
    }
    eprintln!("{} [y/N]", prompt);
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
