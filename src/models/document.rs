use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::source::FileType;
use super::tag::Tag;

/// A typed metadata value attached to a document.
///
/// Filter predicates compare values for equality; a `List` matches when it
/// contains the requested string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
}

impl MetadataValue {
    /// Whether this stored value satisfies an equality predicate against `expected`.
    pub fn matches(&self, expected: &MetadataValue) -> bool {
        match (self, expected) {
            (MetadataValue::List(items), MetadataValue::String(s)) => items.contains(s),
            (MetadataValue::Integer(a), MetadataValue::Float(b))
            | (MetadataValue::Float(b), MetadataValue::Integer(a)) => (*a as f64 - b).abs() < 1e-9,
            (a, b) => a == b,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Integer(n)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Boolean(b)
    }
}

/// Document-level metadata keyed by field name.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A source document. Owns its chunks; deleting it removes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub title: String,
    pub file_type: FileType,
    pub size_bytes: u64,
    pub checksum: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub created_at: String,
    pub updated_at: String,
    /// Extracted text. Only populated while indexing; never persisted.
    #[serde(skip)]
    pub content: String,
}

impl Document {
    /// Deterministic id derived from the document's location.
    pub fn generate_id(location: &str) -> String {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(location.as_bytes());
        hex::encode(&hash[..16])
    }

    pub fn new(
        location: &str,
        path: impl Into<String>,
        title: impl Into<String>,
        file_type: FileType,
        content: String,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: Self::generate_id(location),
            path: path.into(),
            title: title.into(),
            file_type,
            size_bytes: content.len() as u64,
            checksum: crate::utils::calculate_checksum(&content),
            metadata: Metadata::new(),
            tags: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
            content,
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A bounded, ordered slice of a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: u32,
    pub content: String,
    pub token_count: u32,
    pub start_offset: u64,
    pub end_offset: u64,
    pub line_start: u32,
    pub line_end: u32,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
}

impl DocumentChunk {
    /// Stable chunk id: re-indexing a document reproduces the same ids.
    pub fn generate_id(document_id: &str, chunk_index: u32) -> String {
        use uuid::Uuid;
        let name = format!("{}:{}", document_id, chunk_index);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// Per-document indexing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum IndexState {
    Pending,
    Chunking,
    Embedding,
    Persisting,
    Indexed,
    Failed(String),
}

impl IndexState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IndexState::Indexed | IndexState::Failed(_))
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexState::Pending => write!(f, "pending"),
            IndexState::Chunking => write!(f, "chunking"),
            IndexState::Embedding => write!(f, "embedding"),
            IndexState::Persisting => write!(f, "persisting"),
            IndexState::Indexed => write!(f, "indexed"),
            IndexState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of indexing a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub id: String,
    pub title: String,
    pub path: String,
    pub file_type: FileType,
    pub file_size: u64,
    pub chunk_count: usize,
    /// True when the stored chunk set was already current and nothing was re-embedded.
    pub unchanged: bool,
}

impl IndexSummary {
    pub fn from_document(document: &Document, chunk_count: usize, unchanged: bool) -> Self {
        Self {
            id: document.id.clone(),
            title: document.title.clone(),
            path: document.path.clone(),
            file_type: document.file_type,
            file_size: document.size_bytes,
            chunk_count,
            unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_generate_id() {
        let id = Document::generate_id("file:/docs/handbook.md");
        assert_eq!(id.len(), 32);
        assert_eq!(id, Document::generate_id("file:/docs/handbook.md"));
        assert_ne!(id, Document::generate_id("file:/docs/other.md"));
    }

    #[test]
    fn test_chunk_generate_id() {
        let id = DocumentChunk::generate_id("abc123", 5);
        assert_eq!(id.len(), 36);
        assert_eq!(id, DocumentChunk::generate_id("abc123", 5));
        assert_ne!(id, DocumentChunk::generate_id("abc123", 6));
    }

    #[test]
    fn test_document_new_tracks_size_and_checksum() {
        let doc = Document::new(
            "inline:memo",
            "memo",
            "Memo",
            FileType::Text,
            "content".to_string(),
        )
        .with_metadata("department", "finance");
        assert_eq!(doc.size_bytes, 7);
        assert_eq!(doc.checksum.len(), 64);
        assert_eq!(doc.created_at, doc.updated_at);
        assert_eq!(
            doc.metadata.get("department"),
            Some(&MetadataValue::String("finance".to_string()))
        );
    }

    #[test]
    fn test_document_content_not_serialized() {
        let doc = Document::new("inline:x", "x", "X", FileType::Text, "secret".to_string());
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_metadata_value_matching() {
        let list = MetadataValue::List(vec!["sap".to_string(), "erp".to_string()]);
        assert!(list.matches(&MetadataValue::from("erp")));
        assert!(!list.matches(&MetadataValue::from("crm")));
        assert!(MetadataValue::Integer(3).matches(&MetadataValue::Float(3.0)));
        assert!(!MetadataValue::Boolean(true).matches(&MetadataValue::from("true")));
    }

    #[test]
    fn test_metadata_value_untagged_serde() {
        let value: MetadataValue = serde_json::from_str("42").unwrap();
        assert_eq!(value, MetadataValue::Integer(42));
        let value: MetadataValue = serde_json::from_str("[\"a\"]").unwrap();
        assert_eq!(value, MetadataValue::List(vec!["a".to_string()]));
    }

    #[test]
    fn test_index_state_display() {
        assert_eq!(IndexState::Embedding.to_string(), "embedding");
        assert!(IndexState::Failed("x".to_string()).is_terminal());
        assert!(!IndexState::Persisting.is_terminal());
    }
}
