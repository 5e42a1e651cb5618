mod config;
mod document;
mod search;
mod source;
mod stats;
mod tag;

pub use config::{
    Config, DEFAULT_DATABASE_URL, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_EMBEDDING_URL, EmbeddingApi, EmbeddingConfig, IndexingConfig, ResolvedConfig,
    RetrievalConfig, VectorDriver, VectorStoreConfig,
};
pub use document::{
    Document, DocumentChunk, IndexState, IndexSummary, Metadata, MetadataValue,
};
pub use search::{
    Citation, ContextBundle, DEFAULT_CONTEXT_MAX_CHUNKS, DEFAULT_CONTEXT_THRESHOLD,
    DEFAULT_SEARCH_LIMIT, DEFAULT_SEARCH_THRESHOLD, MetadataCondition, OutputFormat, ScoredChunk,
    SearchFilter, SearchParams, SearchRequest, SearchResult, SearchResults, SimilarityMetric,
    SourceDocument,
};
pub use source::{DocumentSource, FileType};
pub use stats::{CorpusStats, EmbeddingServiceInfo};
pub use tag::{Tag, parse_tags};
