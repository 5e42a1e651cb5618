//! Search-related models for queries, filters, results and context bundles.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::document::{Document, DocumentChunk, MetadataValue};
use super::source::FileType;
use super::tag::Tag;

/// Default result limit for raw search.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
/// Default similarity threshold for raw search.
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.1;
/// Default number of chunks assembled into a context bundle.
pub const DEFAULT_CONTEXT_MAX_CHUNKS: usize = 5;
/// Default similarity threshold for context assembly.
pub const DEFAULT_CONTEXT_THRESHOLD: f32 = 0.7;

/// Output format for CLI rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// Vector comparison metric.
///
/// Cosine scores are similarities (higher is better, range [-1, 1]);
/// L2 scores are Euclidean distances (lower is better).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    L2,
}

impl SimilarityMetric {
    /// True when larger scores mean closer vectors.
    pub fn higher_is_better(self) -> bool {
        matches!(self, SimilarityMetric::Cosine)
    }

    /// Whether `score` passes `threshold` in this metric's direction.
    pub fn passes(self, score: f32, threshold: f32) -> bool {
        match self {
            SimilarityMetric::Cosine => score >= threshold,
            SimilarityMetric::L2 => score <= threshold,
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Cosine => write!(f, "cosine"),
            SimilarityMetric::L2 => write!(f, "l2"),
        }
    }
}

impl std::str::FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" | "cos" => Ok(SimilarityMetric::Cosine),
            "l2" | "euclidean" => Ok(SimilarityMetric::L2),
            _ => Err(format!("unknown similarity metric: {}", s)),
        }
    }
}

/// Equality predicate on a document metadata field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataCondition {
    pub key: String,
    pub value: MetadataValue,
}

/// Coarse pre-filter applied before vector ranking.
///
/// Every non-empty criterion must hold. `tags` and `metadata` are AND-ed,
/// `document_ids`, `file_types` and `keywords` match any listed entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(default)]
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub file_types: Vec<FileType>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub metadata: Vec<MetadataCondition>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty()
            && self.file_types.is_empty()
            && self.tags.is_empty()
            && self.keywords.is_empty()
            && self.metadata.is_empty()
    }

    /// Document-level criteria: ids, file types, tags and metadata.
    pub fn matches_document(&self, document: &Document) -> bool {
        if !self.document_ids.is_empty() && !self.document_ids.contains(&document.id) {
            return false;
        }
        if !self.file_types.is_empty() && !self.file_types.contains(&document.file_type) {
            return false;
        }
        if !self.tags.iter().all(|t| document.tags.contains(t)) {
            return false;
        }
        self.metadata.iter().all(|cond| {
            document
                .metadata
                .get(&cond.key)
                .is_some_and(|v| v.matches(&cond.value))
        })
    }

    /// Chunk-level criteria: any keyword appears in the chunk's annotations or text.
    pub fn matches_chunk(&self, chunk: &DocumentChunk) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let content = chunk.content.to_lowercase();
        self.keywords.iter().any(|k| {
            let k = k.to_lowercase();
            chunk.keywords.contains(&k) || content.contains(&k)
        })
    }
}

/// Parameters for a vector index query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub limit: usize,
    pub threshold: f32,
    pub metric: SimilarityMetric,
    pub filter: SearchFilter,
}

impl SearchParams {
    pub fn new(limit: usize, threshold: f32) -> Self {
        Self {
            limit,
            threshold,
            metric: SimilarityMetric::Cosine,
            filter: SearchFilter::default(),
        }
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Raw hit returned by a vector store, best-first.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Caller-facing search request; `None` fields fall back to configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
    pub metric: Option<SimilarityMetric>,
    #[serde(default)]
    pub filter: SearchFilter,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// A single ranked chunk with its document's display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: String,
    pub chunk_id: String,
    pub document_path: String,
    pub document_title: String,
    pub file_type: FileType,
    pub content: String,
    pub score: f32,
    pub chunk_index: u32,
    pub line_start: u32,
    pub line_end: u32,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl SearchResult {
    /// Location hint: `path:start-end`.
    pub fn location(&self) -> String {
        format!(
            "{}:{}-{}",
            self.document_path, self.line_start, self.line_end
        )
    }
}

/// Results of one search call.
///
/// An empty `results` list is a genuine zero-match outcome; failures are
/// reported as errors, never as an empty list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub metric: SimilarityMetric,
    pub limit: usize,
    pub threshold: f32,
    pub results: Vec<SearchResult>,
    pub duration_ms: u64,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

/// Source attribution for one chunk included in a context bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: String,
    pub document_title: String,
    pub document_path: String,
    pub chunk_index: u32,
    pub score: f32,
}

/// A distinct document referenced by a context bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub document_id: String,
    pub title: String,
    pub path: String,
    /// Best score among this document's cited chunks.
    pub best_score: f32,
}

/// Concatenated context for a downstream generation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    pub query: String,
    pub context: String,
    pub citations: Vec<Citation>,
    pub sources: Vec<SourceDocument>,
    /// Number of chunks that passed the threshold.
    pub match_count: usize,
    pub threshold: f32,
}

impl ContextBundle {
    /// True only when the index returned no match above the threshold.
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}
