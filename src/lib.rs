pub mod cli;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::{AppError, EmbeddingError, IndexError, SearchError, VectorStoreError};
pub use models::{Config, OutputFormat};
pub use services::{
    Embedder, HttpEmbeddingClient, InMemoryBackend, IndexingPipeline, PgVectorBackend,
    RetrievalService, TextChunker, VectorStore,
};
