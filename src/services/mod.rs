pub mod chunker;
pub mod embedding;
pub mod extract;
pub mod indexing;
pub mod retrieval;
pub mod similarity;
pub mod vector_store;

pub use chunker::TextChunker;
pub use embedding::{Embedder, HttpEmbeddingClient, probe_embedder, validate_embeddings};
pub use extract::{Extracted, SourceExtractor};
pub use indexing::{IndexOutcome, IndexingPipeline};
pub use retrieval::RetrievalService;
pub use vector_store::{
    InMemoryBackend, PgVectorBackend, StoredDocument, VectorStore, create_backend,
};
