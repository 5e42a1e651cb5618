//! Vector store abstraction layer.
//!
//! Backends persist documents together with their full chunk set and answer
//! nearest-neighbour queries. Two drivers exist: an exact in-memory scan
//! (optionally snapshotted to disk) and PostgreSQL with pgvector.

mod memory;
mod pgvector;

pub use memory::InMemoryBackend;
pub use pgvector::PgVectorBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::VectorStoreError;
use crate::models::{
    CorpusStats, Document, DocumentChunk, ScoredChunk, SearchParams, VectorDriver,
    VectorStoreConfig,
};

/// A stored document with its chunk count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub document: Document,
    pub chunk_count: usize,
}

/// Abstract trait for vector store operations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create tables, indexes or snapshot files if they don't exist.
    async fn ensure_schema(&self) -> Result<(), VectorStoreError>;

    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Replace the document's record and its whole chunk set in one atomic step.
    ///
    /// Every vector is checked against the store dimension before anything is
    /// written; on any failure the previous state is left untouched.
    async fn upsert_chunks(
        &self,
        document: &Document,
        chunks: Vec<DocumentChunk>,
    ) -> Result<(), VectorStoreError>;

    /// Rank chunks against `query`, best-first, honouring limit, threshold and filter.
    /// Equal scores keep insertion order.
    async fn search(
        &self,
        query: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError>;

    /// Delete a document and all of its chunks. `NotFound` when absent.
    async fn delete_document(&self, document_id: &str) -> Result<(), VectorStoreError>;

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, VectorStoreError>;

    /// All stored documents ordered by path.
    async fn list_documents(&self) -> Result<Vec<StoredDocument>, VectorStoreError>;

    /// Chunks of one document in ordinal order.
    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>, VectorStoreError>;

    async fn stats(&self) -> Result<CorpusStats, VectorStoreError>;

    /// Remove every document and chunk.
    async fn clear(&self) -> Result<(), VectorStoreError>;

    /// Vector dimension this store accepts.
    fn dimension(&self) -> usize;

    fn backend_name(&self) -> &'static str;
}

/// Reject vectors whose length differs from the store dimension.
pub fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), VectorStoreError> {
    if vector.len() != expected {
        return Err(VectorStoreError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Create a vector store backend for the configured driver and ensure its schema.
pub async fn create_backend(
    config: &VectorStoreConfig,
    dimension: usize,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    let backend: Arc<dyn VectorStore> = match config.driver {
        VectorDriver::Memory => match config.snapshot_path {
            Some(ref path) => Arc::new(InMemoryBackend::with_snapshot(path, dimension).await?),
            None => Arc::new(InMemoryBackend::new(dimension)),
        },
        VectorDriver::Postgres => Arc::new(PgVectorBackend::connect(config, dimension).await?),
    };

    backend.ensure_schema().await?;
    tracing::debug!(backend = backend.backend_name(), dimension, "vector store ready");

    Ok(backend)
}
