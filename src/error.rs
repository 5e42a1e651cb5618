//! Error types for the retrieval core.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to tag parsing and validation.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("invalid tag key: {0}")]
    InvalidKey(String),

    #[error("invalid tag value: {0}")]
    InvalidValue(String),

    #[error("tag parse error: {0}")]
    ParseError(String),
}

/// Errors related to embedding operations.
///
/// `Unavailable`, `Timeout` and `MalformedResponse` all mean the embedding
/// provider could not produce usable output; see [`EmbeddingError::is_unavailable`].
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),

    #[error("embedding request timed out")]
    Timeout,

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding count mismatch: sent {expected} texts, received {actual} vectors")]
    CountMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// True when the upstream model could not be reached or returned unusable output.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Unavailable(_)
                | EmbeddingError::Timeout
                | EmbeddingError::MalformedResponse(_)
        )
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EmbeddingError::Timeout
        } else if e.is_decode() {
            EmbeddingError::MalformedResponse(e.to_string())
        } else {
            EmbeddingError::Unavailable(e.to_string())
        }
    }
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Timeout => true,
            // Server errors might be transient (e.g., 503 Service Unavailable)
            EmbeddingError::Unavailable(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("connect")
                    || msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.contains("unavailable")
                    || msg.contains("too many requests")
            }
            EmbeddingError::MalformedResponse(_)
            | EmbeddingError::DimensionMismatch { .. }
            | EmbeddingError::CountMismatch { .. } => false,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector store: {0}")]
    ConnectionError(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("index write failure: {0}")]
    WriteFailure(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("pgvector extension error: {0}")]
    PgVectorExtensionError(String),
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            VectorStoreError::ConnectionError(_) => true,
            VectorStoreError::SchemaError(msg)
            | VectorStoreError::WriteFailure(msg)
            | VectorStoreError::SearchError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
                    || msg_lower.contains("too many")
            }
            VectorStoreError::DimensionMismatch { .. }
            | VectorStoreError::NotFound(_)
            | VectorStoreError::PgVectorExtensionError(_) => false,
        }
    }
}

/// Errors related to indexing operations.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("file read error: {0}")]
    FileReadError(String),

    #[error("directory walk error: {0}")]
    WalkError(String),

    #[error("embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStoreError(#[from] VectorStoreError),

    #[error("indexing timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("no files found")]
    NoFilesFound,
}

impl IndexError {
    /// Whether the failure came from the vector store while writing.
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            IndexError::VectorStoreError(VectorStoreError::WriteFailure(_))
        )
    }
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors related to search and context retrieval.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStoreError(#[from] VectorStoreError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("tag error: {0}")]
    Tag(#[from] TagError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("{0}")]
    Other(String),
}
