//! Query-side service: semantic search and context assembly.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use super::embedding::{Embedder, probe_embedder};
use super::vector_store::VectorStore;
use crate::error::SearchError;
use crate::models::{
    Citation, ContextBundle, CorpusStats, Document, EmbeddingServiceInfo, RetrievalConfig,
    ScoredChunk, SearchParams, SearchRequest, SearchResult, SearchResults, SourceDocument,
};

/// Separator between chunks in an assembled context.
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Embeds queries, ranks chunks and maps them to document display metadata.
pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl RetrievalService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Search with the configured metric and no filter.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<SearchResults, SearchError> {
        self.search_with(SearchRequest {
            query: query.to_string(),
            limit,
            threshold,
            ..Default::default()
        })
        .await
    }

    /// Search with explicit metric and filter.
    ///
    /// An empty result list means nothing passed the threshold; any failure
    /// to embed or query is returned as an error.
    pub async fn search_with(&self, request: SearchRequest) -> Result<SearchResults, SearchError> {
        let start = Instant::now();
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidQuery("query must not be empty".to_string()));
        }

        let params = SearchParams::new(
            request.limit.unwrap_or(self.config.search_limit),
            request.threshold.unwrap_or(self.config.search_threshold),
        )
        .with_metric(request.metric.unwrap_or(self.config.metric))
        .with_filter(request.filter);

        let vector = self.embedder.embed(query).await?;
        let hits = self.store.search(&vector, &params).await?;
        let results = self.to_results(hits).await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            query,
            metric = %params.metric,
            results = results.len(),
            duration_ms,
            "search complete"
        );

        Ok(SearchResults {
            query: query.to_string(),
            metric: params.metric,
            limit: params.limit,
            threshold: params.threshold,
            results,
            duration_ms,
        })
    }

    /// Assemble the top chunks into a context bundle with citations.
    pub async fn get_context(
        &self,
        query: &str,
        max_chunks: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<ContextBundle, SearchError> {
        let threshold = threshold.unwrap_or(self.config.context_threshold);
        let results = self
            .search_with(SearchRequest {
                query: query.to_string(),
                limit: Some(max_chunks.unwrap_or(self.config.context_max_chunks)),
                threshold: Some(threshold),
                ..Default::default()
            })
            .await?;

        Ok(build_context(results, threshold))
    }

    pub async fn stats(&self) -> Result<CorpusStats, SearchError> {
        Ok(self.store.stats().await?)
    }

    /// Probe the embedding endpoint. Never touches the index.
    pub async fn test_embedding_service(&self) -> EmbeddingServiceInfo {
        probe_embedder(self.embedder.as_ref()).await
    }

    /// Join hits with their documents. Hits whose document vanished are dropped.
    async fn to_results(&self, hits: Vec<ScoredChunk>) -> Result<Vec<SearchResult>, SearchError> {
        let mut documents: HashMap<String, Option<Document>> = HashMap::new();
        let mut results = Vec::with_capacity(hits.len());

        for hit in hits {
            if !documents.contains_key(&hit.chunk.document_id) {
                let document = self.store.get_document(&hit.chunk.document_id).await?;
                documents.insert(hit.chunk.document_id.clone(), document);
            }
            let Some(Some(document)) = documents.get(&hit.chunk.document_id) else {
                continue;
            };

            results.push(SearchResult {
                document_id: document.id.clone(),
                chunk_id: hit.chunk.id,
                document_path: document.path.clone(),
                document_title: document.title.clone(),
                file_type: document.file_type,
                content: hit.chunk.content,
                score: hit.score,
                chunk_index: hit.chunk.chunk_index,
                line_start: hit.chunk.line_start,
                line_end: hit.chunk.line_end,
                tags: document.tags.clone(),
            });
        }

        Ok(results)
    }
}

/// Concatenate ranked results with numbered source headers.
fn build_context(results: SearchResults, threshold: f32) -> ContextBundle {
    let mut seen = HashSet::new();
    let mut sections = Vec::new();
    let mut citations = Vec::new();
    let mut sources: Vec<SourceDocument> = Vec::new();

    for result in &results.results {
        if !seen.insert((result.document_id.as_str(), result.chunk_index)) {
            continue;
        }

        sections.push(format!(
            "[{}] {} ({})\n{}",
            citations.len() + 1,
            result.document_title,
            result.location(),
            result.content.trim()
        ));
        citations.push(Citation {
            document_id: result.document_id.clone(),
            document_title: result.document_title.clone(),
            document_path: result.document_path.clone(),
            chunk_index: result.chunk_index,
            score: result.score,
        });
        // Results arrive best-first, so the first score seen per document is its best.
        if !sources.iter().any(|s| s.document_id == result.document_id) {
            sources.push(SourceDocument {
                document_id: result.document_id.clone(),
                title: result.document_title.clone(),
                path: result.document_path.clone(),
                best_score: result.score,
            });
        }
    }

    ContextBundle {
        query: results.query.clone(),
        context: sections.join(CONTEXT_SEPARATOR),
        match_count: citations.len(),
        citations,
        sources,
        threshold,
    }
}
