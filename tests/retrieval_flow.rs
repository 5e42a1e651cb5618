//! End-to-end indexing and retrieval against the in-memory backend.

use std::sync::Arc;

use async_trait::async_trait;
use docrag::error::{EmbeddingError, IndexError};
use docrag::models::{
    Document, FileType, IndexingConfig, RetrievalConfig, SearchParams, SearchRequest,
};
use docrag::services::{
    Embedder, InMemoryBackend, IndexingPipeline, RetrievalService, VectorStore,
    validate_embeddings,
};
use docrag::utils::text::tokenize_terms;

const DIM: usize = 64;

/// Bag-of-words embedder: each term is hashed into one of `dimension` buckets.
struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dimension];
        for term in tokenize_terms(text) {
            let mut hash: u64 = 0xcbf29ce484222325;
            for b in term.bytes() {
                hash ^= u64::from(b);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % self.dimension as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let vectors = texts.iter().map(|t| self.vector(t)).collect();
        validate_embeddings(texts.len(), self.dimension, vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        "hash"
    }

    fn endpoint(&self) -> &str {
        "local"
    }
}

fn small_chunks() -> IndexingConfig {
    IndexingConfig {
        chunk_size: 20,
        chunk_overlap: 2,
        min_chunk_size: 2,
        ..Default::default()
    }
}

fn doc(name: &str, text: &str) -> Document {
    Document::new(
        &format!("inline:{}", name),
        name,
        name,
        FileType::Text,
        text.to_string(),
    )
}

struct Harness {
    embedder: Arc<HashEmbedder>,
    store: Arc<dyn VectorStore>,
    pipeline: IndexingPipeline,
    retrieval: RetrievalService,
}

impl Harness {
    fn with_store(store: Arc<dyn VectorStore>) -> Self {
        let embedder = Arc::new(HashEmbedder::new(DIM));
        let pipeline = IndexingPipeline::new(embedder.clone(), store.clone(), &small_chunks());
        let retrieval =
            RetrievalService::new(embedder.clone(), store.clone(), RetrievalConfig::default());
        Self {
            embedder,
            store,
            pipeline,
            retrieval,
        }
    }

    fn new() -> Self {
        Self::with_store(Arc::new(InMemoryBackend::new(DIM)))
    }
}

const THREE_TOPICS: &str = "Invoices are issued monthly and invoice numbers follow the ledger.\n\n\
Pump maintenance requires checking valves, seals and the pump impeller.\n\n\
Quarterly travel policy covers flights, hotels and meal allowances abroad.";

#[tokio::test]
async fn test_chunk_ordinals_are_contiguous() {
    let h = Harness::new();
    let summary = h
        .pipeline
        .index_document(doc("topics", THREE_TOPICS))
        .await
        .unwrap();
    assert!(summary.chunk_count >= 3);

    let chunks = h.store.get_chunks(&summary.id).await.unwrap();
    assert_eq!(chunks.len(), summary.chunk_count);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index as usize, i);
        assert_eq!(chunk.embedding.len(), DIM);
    }
}

#[tokio::test]
async fn test_query_nearest_middle_chunk_returns_it() {
    let h = Harness::new();
    let summary = h
        .pipeline
        .index_document(doc("topics", THREE_TOPICS))
        .await
        .unwrap();
    let chunks = h.store.get_chunks(&summary.id).await.unwrap();
    let middle = &chunks[1];

    let results = h
        .retrieval
        .search(&middle.content, Some(1), Some(0.0))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results.results[0].chunk_index, 1);
    assert_eq!(results.results[0].chunk_id, middle.id);
}

#[tokio::test]
async fn test_chunk_vector_ranks_itself_first() {
    let h = Harness::new();
    h.pipeline
        .index_document(doc("topics", THREE_TOPICS))
        .await
        .unwrap();
    h.pipeline
        .index_document(doc("other", "Completely unrelated gardening advice about tulips."))
        .await
        .unwrap();

    for stored in h.store.list_documents().await.unwrap() {
        for chunk in h.store.get_chunks(&stored.document.id).await.unwrap() {
            let hits = h
                .store
                .search(&chunk.embedding, &SearchParams::new(1, 0.0))
                .await
                .unwrap();
            assert_eq!(chunk.embedding, h.embedder.vector(&chunk.content));
            assert_eq!(hits[0].chunk.id, chunk.id);
            assert!((hits[0].score - 1.0).abs() < 1e-5);
        }
    }
}

#[tokio::test]
async fn test_results_sorted_thresholded_and_limited() {
    let h = Harness::new();
    for i in 0..6 {
        h.pipeline
            .index_document(doc(
                &format!("pump-{}", i),
                &format!("Pump note {} about pump valves and seals number {}", i, i * 7),
            ))
            .await
            .unwrap();
    }

    let results = h.retrieval.search("pump valves", Some(4), Some(0.2)).await.unwrap();
    assert!(!results.is_empty());
    assert!(results.len() <= 4);
    for pair in results.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(results.results.iter().all(|r| r.score >= 0.2));
}

#[tokio::test]
async fn test_reindex_yields_identical_results() {
    let h = Harness::new();
    let documents = [
        doc("topics", THREE_TOPICS),
        doc("pumps", "Pump seals wear out; replace the pump seals yearly."),
    ];
    for d in documents.iter().cloned() {
        h.pipeline.index_document(d).await.unwrap();
    }
    let before = h.retrieval.search("pump seals", Some(5), Some(0.0)).await.unwrap();

    for d in documents.iter().cloned() {
        let summary = h.pipeline.index_document(d).await.unwrap();
        assert!(summary.unchanged);
    }
    let after = h.retrieval.search("pump seals", Some(5), Some(0.0)).await.unwrap();

    let key = |r: &docrag::models::SearchResult| (r.chunk_id.clone(), r.score);
    assert_eq!(
        before.results.iter().map(key).collect::<Vec<_>>(),
        after.results.iter().map(key).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_deleted_document_never_returns() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("index.json");

    let store = InMemoryBackend::with_snapshot(&snapshot, DIM).await.unwrap();
    let h = Harness::with_store(Arc::new(store));
    let summary = h
        .pipeline
        .index_document(doc("pumps", "Pump seals wear out; replace the pump seals yearly."))
        .await
        .unwrap();
    h.pipeline.delete_document(&summary.id).await.unwrap();

    let results = h.retrieval.search("pump seals", None, Some(0.0)).await.unwrap();
    assert!(results.is_empty());

    let reopened = InMemoryBackend::with_snapshot(&snapshot, DIM).await.unwrap();
    let h = Harness::with_store(Arc::new(reopened));
    assert!(h.store.get_document(&summary.id).await.unwrap().is_none());
    let results = h.retrieval.search("pump seals", None, Some(0.0)).await.unwrap();
    assert!(results.is_empty());

    assert!(matches!(
        h.pipeline.delete_document(&summary.id).await,
        Err(IndexError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_fitzer_context_is_found() {
    let h = Harness::new();
    for i in 0..7 {
        h.pipeline
            .index_document(doc(
                &format!("fitzer-{}", i),
                &format!("Fitzer pump service report {}", i),
            ))
            .await
            .unwrap();
    }
    h.pipeline
        .index_document(doc("billing", "Invoice totals for the quarter were reconciled."))
        .await
        .unwrap();

    let bundle = h.retrieval.get_context("Fitzer", Some(5), Some(0.1)).await.unwrap();
    assert!(!bundle.is_empty());
    assert_eq!(bundle.citations.len(), 5);
    assert!(bundle.context.contains("Fitzer"));
    assert!(bundle.sources.iter().all(|s| s.title.starts_with("fitzer-")));
}

#[tokio::test]
async fn test_wrong_dimension_leaves_prior_state() {
    let h = Harness::new();
    let original = h
        .pipeline
        .index_document(doc("pumps", "Pump seals wear out; replace the pump seals yearly."))
        .await
        .unwrap();
    let before = h.store.get_chunks(&original.id).await.unwrap();

    let narrow = Arc::new(HashEmbedder::new(DIM / 2));
    let pipeline = IndexingPipeline::new(narrow, h.store.clone(), &small_chunks());
    let result = pipeline
        .index_document(doc("pumps", "Pump seals now last two years with the new supplier."))
        .await;
    assert!(matches!(
        result,
        Err(IndexError::EmbeddingError(EmbeddingError::DimensionMismatch {
            expected: DIM,
            actual
        })) if actual == DIM / 2
    ));

    let after = h.store.get_chunks(&original.id).await.unwrap();
    assert_eq!(before, after);
    let stored = h.store.get_document(&original.id).await.unwrap().unwrap();
    assert_eq!(
        stored.checksum,
        docrag::utils::calculate_checksum("Pump seals wear out; replace the pump seals yearly.")
    );

    let results = h
        .retrieval
        .search_with(SearchRequest::new("pump seals").with_threshold(0.0))
        .await
        .unwrap();
    assert_eq!(results.results[0].document_id, original.id);
}
