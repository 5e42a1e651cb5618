//! Diagnostic models for corpus statistics and embedding connectivity.

use serde::{Deserialize, Serialize};

/// Aggregate counts over the indexed corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub total_documents: u64,
    pub total_chunks: u64,
    /// Mean chunk length in characters.
    pub average_chunk_size: f64,
    pub documents_with_embeddings: u64,
    pub total_size_bytes: u64,
}

/// Result of probing the embedding endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingServiceInfo {
    pub reachable: bool,
    pub endpoint: String,
    pub model: String,
    pub expected_dimension: usize,
    pub dimension: Option<usize>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl EmbeddingServiceInfo {
    /// Reachable and producing vectors of the configured size.
    pub fn is_healthy(&self) -> bool {
        self.reachable && self.dimension == Some(self.expected_dimension)
    }
}
