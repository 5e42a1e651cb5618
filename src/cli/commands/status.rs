use anyhow::{Context, Result};

use super::{cli_store_config, store_location};
use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat, VectorDriver};
use crate::services::{HttpEmbeddingClient, create_backend};

pub async fn handle_status(format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    if verbose {
        match config.path {
            Some(ref path) => eprintln!("Config: {}", path.display()),
            None => eprintln!("Config: defaults (no config file found)"),
        }
    }
    let config = config.config;

    let client =
        HttpEmbeddingClient::new(&config.embedding).context("failed to create embedding client")?;
    let embedding = client.test_connection().await;

    let store_config = cli_store_config(&config);
    let (vector_store_connected, stats) =
        match create_backend(&store_config, config.embedding.dimension as usize).await {
            Ok(store) => {
                let connected = store.health_check().await.unwrap_or(false);
                let stats = if connected {
                    store.stats().await.ok()
                } else {
                    None
                };
                (connected, stats)
            }
            Err(e) => {
                tracing::debug!(error = %e, "vector store unavailable");
                (false, None)
            }
        };

    let status = StatusInfo {
        embedding,
        vector_store_driver: store_config.driver.to_string(),
        vector_store_location: store_location(&store_config),
        vector_store_connected,
        stats,
    };

    print!("{}", formatter.format_status(&status));

    if !status.embedding.is_healthy() || !vector_store_connected {
        eprintln!();
        if !status.embedding.reachable {
            eprintln!(
                "Warning: embedding service not reachable at {}. Check embedding.url in config.",
                status.embedding.endpoint
            );
        } else if !status.embedding.is_healthy() {
            eprintln!(
                "Warning: embedding model returns vectors of a different size than embedding.dimension ({}).",
                status.embedding.expected_dimension
            );
        }
        if !vector_store_connected {
            match store_config.driver {
                VectorDriver::Memory => {
                    eprintln!("Warning: index snapshot could not be loaded. Check snapshot_path.");
                }
                VectorDriver::Postgres => {
                    eprintln!("Warning: PostgreSQL not accessible. Check connection settings.");
                }
            }
        }
    }

    Ok(())
}
