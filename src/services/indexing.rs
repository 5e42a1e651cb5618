//! Indexing pipeline: extraction, chunking, embedding and atomic persistence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::chunker::TextChunker;
use super::embedding::{Embedder, validate_embeddings};
use super::extract::SourceExtractor;
use super::vector_store::VectorStore;
use crate::error::{IndexError, VectorStoreError};
use crate::models::{
    Document, DocumentChunk, DocumentSource, IndexState, IndexSummary, IndexingConfig, Metadata,
    Tag,
};

type LockRegistry = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// Outcome of indexing one document found in a source.
#[derive(Debug)]
pub struct IndexOutcome {
    /// Path or inline name of the candidate.
    pub location: String,
    pub result: Result<IndexSummary, IndexError>,
}

impl IndexOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Turns sources into stored, embedded chunks.
///
/// Work on one document is serialized through a per-document lock; different
/// documents proceed independently. A document's chunk set is only replaced
/// once every chunk has been embedded, so failures, timeouts and cancelled
/// calls leave the previous state in place.
pub struct IndexingPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunker: TextChunker,
    extractor: SourceExtractor,
    timeout: Duration,
    locks: LockRegistry,
    states: StdRwLock<HashMap<String, IndexState>>,
}

impl IndexingPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: &IndexingConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            chunker: TextChunker::new(config),
            extractor: SourceExtractor::new(config),
            timeout: Duration::from_secs(config.timeout_secs),
            locks: StdMutex::new(HashMap::new()),
            states: StdRwLock::new(HashMap::new()),
        }
    }

    /// Override the per-document time limit taken from the config.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Index everything a source refers to.
    ///
    /// Per-document failures are reported in the outcomes and never abort
    /// the remaining documents.
    pub async fn index_source(&self, source: DocumentSource) -> Result<Vec<IndexOutcome>, IndexError> {
        self.index_source_with(source, &[], &Metadata::new()).await
    }

    /// Like [`index_source`](Self::index_source), attaching `tags` and
    /// `metadata` to every document. Given metadata overrides extracted keys.
    pub async fn index_source_with(
        &self,
        source: DocumentSource,
        tags: &[Tag],
        metadata: &Metadata,
    ) -> Result<Vec<IndexOutcome>, IndexError> {
        let extracted = self.extractor.extract(&source)?;
        tracing::debug!(source = %source.describe(), candidates = extracted.len(), "extracted source");

        let mut outcomes = Vec::with_capacity(extracted.len());
        for item in extracted {
            let result = match item.document {
                Ok(mut document) => {
                    if !tags.is_empty() {
                        document = document.with_tags(tags.to_vec());
                    }
                    document
                        .metadata
                        .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
                    self.index_document(document).await
                }
                Err(e) => Err(e),
            };

            if let Err(ref e) = result {
                tracing::warn!(location = %item.location, error = %e, "failed to index document");
            }
            outcomes.push(IndexOutcome {
                location: item.location,
                result,
            });
        }

        Ok(outcomes)
    }

    /// Chunk, embed and persist one document, replacing any previous version.
    ///
    /// If the returned future is dropped before completion the document is
    /// recorded as failed and its committed chunks stay as they were.
    pub async fn index_document(&self, document: Document) -> Result<IndexSummary, IndexError> {
        let id = document.id.clone();
        self.set_state(&id, IndexState::Pending);
        let mut guard = CancelGuard {
            pipeline: self,
            document_id: &id,
            armed: true,
        };

        let result = match tokio::time::timeout(self.timeout, self.run(document)).await {
            Ok(result) => result,
            Err(_) => Err(IndexError::Timeout(self.timeout)),
        };
        guard.armed = false;

        match result {
            Ok(ref summary) => {
                self.set_state(&id, IndexState::Indexed);
                tracing::info!(
                    document_id = %summary.id,
                    title = %summary.title,
                    chunks = summary.chunk_count,
                    unchanged = summary.unchanged,
                    "indexed document"
                );
            }
            Err(ref e) => {
                if e.is_write_failure() {
                    tracing::error!(document_id = %id, error = %e, "vector store rejected write");
                }
                self.set_state(&id, IndexState::Failed(e.to_string()));
            }
        }

        result
    }

    /// Remove a document and its chunks.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), IndexError> {
        let _lock = self.lock_document(document_id).await;

        match self.store.delete_document(document_id).await {
            Ok(()) => {}
            Err(VectorStoreError::NotFound(_)) => {
                return Err(IndexError::NotFound(document_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(document_id);
        tracing::info!(document_id, "deleted document");
        Ok(())
    }

    /// Last known indexing state of a document handled by this pipeline.
    pub fn state(&self, document_id: &str) -> Option<IndexState> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document_id)
            .cloned()
    }

    async fn run(&self, mut document: Document) -> Result<IndexSummary, IndexError> {
        let _lock = self.lock_document(&document.id).await;

        self.set_state(&document.id, IndexState::Chunking);
        let mut chunks = self.chunker.chunk(&document);

        if let Some(existing) = self.store.get_document(&document.id).await? {
            document.created_at = existing.created_at.clone();

            if existing.checksum == document.checksum {
                let stored = self.store.get_chunks(&document.id).await?;
                if self.is_current(&stored, &chunks) {
                    let count = stored.len();
                    if !same_record(&existing, &document) {
                        // Only descriptive fields changed; keep the stored vectors.
                        self.set_state(&document.id, IndexState::Persisting);
                        self.store.upsert_chunks(&document, stored).await?;
                    }
                    return Ok(IndexSummary::from_document(&document, count, true));
                }
            }
        }

        self.set_state(&document.id, IndexState::Embedding);
        if !chunks.is_empty() {
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            // The index dimension is authoritative, whatever the embedder claims.
            let embeddings = validate_embeddings(chunks.len(), self.store.dimension(), embeddings)?;
            for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
                chunk.embedding = embedding;
            }
        }

        self.set_state(&document.id, IndexState::Persisting);
        let count = chunks.len();
        self.store.upsert_chunks(&document, chunks).await?;

        Ok(IndexSummary::from_document(&document, count, false))
    }

    /// Stored chunks match freshly computed ones and carry full vectors.
    fn is_current(&self, stored: &[DocumentChunk], fresh: &[DocumentChunk]) -> bool {
        let dimension = self.store.dimension();
        stored.len() == fresh.len()
            && stored.iter().zip(fresh).all(|(s, f)| {
                s.id == f.id
                    && s.content == f.content
                    && s.start_offset == f.start_offset
                    && s.end_offset == f.end_offset
                    && s.embedding.len() == dimension
            })
    }

    /// Wait for exclusive access to one document.
    async fn lock_document(&self, document_id: &str) -> DocumentLock<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        // Built before awaiting so a cancelled wait still releases the entry.
        let mut held = DocumentLock {
            registry: &self.locks,
            document_id: document_id.to_string(),
            lock,
            guard: None,
        };
        held.guard = Some(held.lock.clone().lock_owned().await);
        held
    }

    fn set_state(&self, document_id: &str, state: IndexState) {
        tracing::debug!(document_id, %state, "index state");
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document_id.to_string(), state);
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Exclusive hold on one document's lock.
///
/// Dropping it releases the lock and removes the registry entry once no
/// other task holds or waits for it.
struct DocumentLock<'a> {
    registry: &'a LockRegistry,
    document_id: String,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DocumentLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the registry, one here.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.document_id);
        }
    }
}

/// Records a document as failed if `index_document` is dropped mid-run.
struct CancelGuard<'a> {
    pipeline: &'a IndexingPipeline,
    document_id: &'a str,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(document_id = self.document_id, "indexing cancelled");
            self.pipeline
                .set_state(self.document_id, IndexState::Failed("cancelled".to_string()));
        }
    }
}

/// Whether the descriptive fields stored for a document are unchanged.
fn same_record(existing: &Document, incoming: &Document) -> bool {
    existing.path == incoming.path
        && existing.title == incoming.title
        && existing.file_type == incoming.file_type
        && existing.tags == incoming.tags
        && existing.metadata == incoming.metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use crate::models::{FileType, MetadataCondition, MetadataValue, SearchFilter, SearchParams};
    use crate::services::vector_store::InMemoryBackend;
    use crate::utils::text::tokenize_terms;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DIM: usize = 16;

    /// Bag-of-words embedder: each term bumps one hashed bucket.
    struct TermEmbedder {
        calls: AtomicUsize,
        dimension: usize,
        output_dimension: usize,
    }

    impl TermEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                dimension: DIM,
                output_dimension: DIM,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for TermEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let vectors = texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; self.output_dimension];
                    for term in tokenize_terms(t) {
                        let bucket = term.bytes().map(usize::from).sum::<usize>() % self.output_dimension;
                        v[bucket] += 1.0;
                    }
                    v
                })
                .collect();
            crate::services::embedding::validate_embeddings(texts.len(), self.output_dimension, vectors)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model(&self) -> &str {
            "term-hash"
        }

        fn endpoint(&self) -> &str {
            "memory://"
        }
    }

    fn small_chunks() -> IndexingConfig {
        IndexingConfig {
            chunk_size: 16,
            chunk_overlap: 4,
            min_chunk_size: 2,
            ..Default::default()
        }
    }

    fn pipeline(embedder: Arc<TermEmbedder>) -> (IndexingPipeline, Arc<InMemoryBackend>) {
        let store = Arc::new(InMemoryBackend::new(DIM));
        let pipeline = IndexingPipeline::new(embedder, store.clone(), &small_chunks());
        (pipeline, store)
    }

    fn report() -> String {
        (0..60)
            .map(|i| format!("valve{} inspected on line {}.", i, i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[tokio::test]
    async fn test_index_inline_source() {
        let embedder = Arc::new(TermEmbedder::new());
        let (pipeline, store) = pipeline(embedder.clone());

        let outcomes = pipeline
            .index_source(DocumentSource::inline("report.txt", report()))
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        let summary = outcomes[0].result.as_ref().unwrap();
        assert!(summary.chunk_count > 1);
        assert!(!summary.unchanged);
        assert_eq!(summary.file_type, FileType::Text);

        let chunks = store.get_chunks(&summary.id).await.unwrap();
        assert_eq!(chunks.len(), summary.chunk_count);
        assert!(chunks.iter().all(|c| c.embedding.len() == DIM));
        assert_eq!(pipeline.state(&summary.id), Some(IndexState::Indexed));
    }

    #[tokio::test]
    async fn test_reindex_unchanged_skips_embedding() {
        let embedder = Arc::new(TermEmbedder::new());
        let (pipeline, store) = pipeline(embedder.clone());

        let first = pipeline
            .index_source(DocumentSource::inline("report.txt", report()))
            .await
            .unwrap();
        let first = first[0].result.as_ref().unwrap().clone();
        let before = store.get_chunks(&first.id).await.unwrap();
        let calls = embedder.calls();

        let second = pipeline
            .index_source(DocumentSource::inline("report.txt", report()))
            .await
            .unwrap();
        let second = second[0].result.as_ref().unwrap();

        assert!(second.unchanged);
        assert_eq!(second.chunk_count, first.chunk_count);
        assert_eq!(embedder.calls(), calls);
        assert_eq!(store.get_chunks(&first.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_reindex_changed_content_replaces_chunks() {
        let embedder = Arc::new(TermEmbedder::new());
        let (pipeline, store) = pipeline(embedder);

        let first = pipeline
            .index_document(Document::new("inline:a", "a", "a", FileType::Text, report()))
            .await
            .unwrap();
        let created_at = store.get_document(&first.id).await.unwrap().unwrap().created_at;

        let second = pipeline
            .index_document(Document::new(
                "inline:a",
                "a",
                "a",
                FileType::Text,
                "a short replacement".to_string(),
            ))
            .await
            .unwrap();

        assert_eq!(second.chunk_count, 1);
        let chunks = store.get_chunks(&first.id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "a short replacement");
        let stored = store.get_document(&first.id).await.unwrap().unwrap();
        assert_eq!(stored.created_at, created_at);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_keeps_previous_state() {
        let good = Arc::new(TermEmbedder::new());
        let store = Arc::new(InMemoryBackend::new(DIM));
        let pipeline = IndexingPipeline::new(good, store.clone(), &small_chunks());
        let summary = pipeline
            .index_document(Document::new("inline:a", "a", "a", FileType::Text, report()))
            .await
            .unwrap();
        let before = store.get_chunks(&summary.id).await.unwrap();

        let bad = Arc::new(TermEmbedder {
            output_dimension: DIM + 1,
            ..TermEmbedder::new()
        });
        let pipeline = IndexingPipeline::new(bad, store.clone(), &small_chunks());
        let err = pipeline
            .index_document(Document::new(
                "inline:a",
                "a",
                "a",
                FileType::Text,
                "different text entirely".to_string(),
            ))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IndexError::EmbeddingError(EmbeddingError::DimensionMismatch { .. })
        ));
        assert_eq!(store.get_chunks(&summary.id).await.unwrap(), before);
        assert!(matches!(
            pipeline.state(&summary.id),
            Some(IndexState::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_siblings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.txt"), "pump maintenance notes").unwrap();
        std::fs::write(dir.path().join("huge.txt"), "x".repeat(256)).unwrap();

        let config = IndexingConfig {
            max_file_size: 128,
            ..small_chunks()
        };
        let store = Arc::new(InMemoryBackend::new(DIM));
        let pipeline = IndexingPipeline::new(Arc::new(TermEmbedder::new()), store.clone(), &config);

        let outcomes = pipeline
            .index_source(DocumentSource::DirectoryPath(dir.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 1);
        assert_eq!(store.stats().await.unwrap().total_documents, 1);
    }

    #[tokio::test]
    async fn test_delete_document() {
        let (pipeline, store) = pipeline(Arc::new(TermEmbedder::new()));
        let summary = pipeline
            .index_document(Document::new("inline:a", "a", "a", FileType::Text, report()))
            .await
            .unwrap();

        pipeline.delete_document(&summary.id).await.unwrap();
        assert!(store.get_document(&summary.id).await.unwrap().is_none());
        let hits = store
            .search(&[1.0; DIM], &SearchParams::new(10, -1.0))
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert!(matches!(
            pipeline.delete_document(&summary.id).await,
            Err(IndexError::NotFound(_))
        ));
        assert_eq!(pipeline.state(&summary.id), None);
    }

    #[tokio::test]
    async fn test_tags_change_without_reembedding() {
        let embedder = Arc::new(TermEmbedder::new());
        let (pipeline, store) = pipeline(embedder.clone());
        let doc = || Document::new("inline:a", "a", "a", FileType::Text, report());

        let summary = pipeline.index_document(doc()).await.unwrap();
        let calls = embedder.calls();

        let tagged = doc().with_tags(vec![Tag::new("dept", "ops").unwrap()]);
        let again = pipeline.index_document(tagged).await.unwrap();

        assert!(again.unchanged);
        assert_eq!(embedder.calls(), calls);
        let stored = store.get_document(&summary.id).await.unwrap().unwrap();
        assert_eq!(stored.tags, vec![Tag::new("dept", "ops").unwrap()]);
    }

    /// Wraps [`TermEmbedder`] with a delay and an optional rendezvous.
    struct StallingEmbedder {
        inner: TermEmbedder,
        delay: Duration,
        barrier: Option<tokio::sync::Barrier>,
    }

    impl StallingEmbedder {
        fn new(delay: Duration) -> Self {
            Self {
                inner: TermEmbedder::new(),
                delay,
                barrier: None,
            }
        }
    }

    #[async_trait]
    impl Embedder for StallingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if let Some(ref barrier) = self.barrier {
                barrier.wait().await;
            }
            tokio::time::sleep(self.delay).await;
            self.inner.embed_batch(texts).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model(&self) -> &str {
            "stalling"
        }

        fn endpoint(&self) -> &str {
            "memory://"
        }
    }

    fn doc_a(content: String) -> Document {
        Document::new("inline:a", "a", "a", FileType::Text, content)
    }

    fn contents(chunks: &[DocumentChunk]) -> Vec<String> {
        chunks.iter().map(|c| c.content.clone()).collect()
    }

    #[tokio::test]
    async fn test_cancelled_run_keeps_committed_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let store = Arc::new(InMemoryBackend::with_snapshot(&path, DIM).await.unwrap());
        let pipeline =
            IndexingPipeline::new(Arc::new(TermEmbedder::new()), store.clone(), &small_chunks());

        let summary = pipeline.index_document(doc_a(report())).await.unwrap();
        let before = store.get_chunks(&summary.id).await.unwrap();

        let cancelled = tokio::select! {
            biased;
            _ = pipeline.index_document(doc_a("a short replacement".to_string())) => false,
            _ = std::future::ready(()) => true,
        };

        let visible = store.get_chunks(&summary.id).await.unwrap();
        let reopened = InMemoryBackend::with_snapshot(&path, DIM).await.unwrap();
        let on_disk = reopened.get_chunks(&summary.id).await.unwrap();
        assert_eq!(visible, on_disk);
        if cancelled {
            assert_eq!(visible, before);
            assert_eq!(
                pipeline.state(&summary.id),
                Some(IndexState::Failed("cancelled".to_string()))
            );
        }
        assert_eq!(pipeline.lock_entries(), 0);
    }

    #[tokio::test]
    async fn test_timeout_keeps_previous_chunks() {
        let (pipeline, store) = pipeline(Arc::new(TermEmbedder::new()));
        let summary = pipeline.index_document(doc_a(report())).await.unwrap();
        let before = store.get_chunks(&summary.id).await.unwrap();

        let slow = IndexingPipeline::new(
            Arc::new(StallingEmbedder::new(Duration::from_secs(30))),
            store.clone(),
            &small_chunks(),
        )
        .with_timeout(Duration::from_millis(50));
        let err = slow
            .index_document(doc_a("a short replacement".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::Timeout(limit) if limit == Duration::from_millis(50)));
        assert_eq!(store.get_chunks(&summary.id).await.unwrap(), before);
        assert!(matches!(slow.state(&summary.id), Some(IndexState::Failed(_))));
        assert_eq!(slow.lock_entries(), 0);
    }

    #[tokio::test]
    async fn test_same_document_writers_do_not_interleave() {
        let store = Arc::new(InMemoryBackend::new(DIM));
        let pipeline = IndexingPipeline::new(
            Arc::new(StallingEmbedder::new(Duration::from_millis(10))),
            store.clone(),
            &small_chunks(),
        );
        let chunker = TextChunker::new(&small_chunks());
        let long = doc_a(report());
        let short = doc_a("pump seals replaced. valves inspected again.".to_string());
        let long_chunks = contents(&chunker.chunk(&long));
        let short_chunks = contents(&chunker.chunk(&short));
        assert_ne!(long_chunks, short_chunks);

        let (first, second) =
            tokio::join!(pipeline.index_document(long), pipeline.index_document(short));
        let first = first.unwrap();
        second.unwrap();

        let stored = contents(&store.get_chunks(&first.id).await.unwrap());
        assert!(stored == long_chunks || stored == short_chunks);
        assert_eq!(pipeline.state(&first.id), Some(IndexState::Indexed));
        assert_eq!(pipeline.lock_entries(), 0);
    }

    #[tokio::test]
    async fn test_different_documents_index_concurrently() {
        // Each embed call waits for the other, so this only finishes if both
        // documents are in flight at once.
        let embedder = StallingEmbedder {
            barrier: Some(tokio::sync::Barrier::new(2)),
            ..StallingEmbedder::new(Duration::ZERO)
        };
        let store = Arc::new(InMemoryBackend::new(DIM));
        let pipeline = IndexingPipeline::new(Arc::new(embedder), store.clone(), &small_chunks());

        let both = async {
            tokio::join!(
                pipeline.index_document(Document::new("inline:a", "a", "a", FileType::Text, report())),
                pipeline.index_document(Document::new("inline:b", "b", "b", FileType::Text, report())),
            )
        };
        let (a, b) = tokio::time::timeout(Duration::from_secs(5), both)
            .await
            .expect("documents were indexed one after the other");

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(store.stats().await.unwrap().total_documents, 2);
    }

    #[tokio::test]
    async fn test_lock_registry_drains() {
        let (pipeline, store) = pipeline(Arc::new(TermEmbedder::new()));

        for i in 0..200 {
            let summary = pipeline
                .index_document(Document::new(
                    &format!("inline:{}", i),
                    format!("{}", i),
                    format!("{}", i),
                    FileType::Text,
                    format!("pump {} inspected", i),
                ))
                .await
                .unwrap();
            pipeline.delete_document(&summary.id).await.unwrap();
        }

        assert_eq!(store.stats().await.unwrap().total_documents, 0);
        assert_eq!(pipeline.lock_entries(), 0);
    }

    #[tokio::test]
    async fn test_source_metadata_is_filterable() {
        let (pipeline, store) = pipeline(Arc::new(TermEmbedder::new()));
        let mut metadata = Metadata::new();
        metadata.insert("team".to_string(), MetadataValue::from("ops"));

        let outcomes = pipeline
            .index_source_with(
                DocumentSource::inline("report.txt", report()),
                &[],
                &metadata,
            )
            .await
            .unwrap();
        let summary = outcomes[0].result.as_ref().unwrap();
        let stored = store.get_document(&summary.id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.get("team"), Some(&MetadataValue::from("ops")));
        assert!(stored.metadata.contains_key("line_count"));

        let filtered = |value: &str| SearchFilter {
            metadata: vec![MetadataCondition {
                key: "team".to_string(),
                value: MetadataValue::from(value),
            }],
            ..Default::default()
        };
        let hits = store
            .search(&[1.0; DIM], &SearchParams::new(5, -1.0).with_filter(filtered("ops")))
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.chunk.document_id == summary.id));

        let misses = store
            .search(&[1.0; DIM], &SearchParams::new(5, -1.0).with_filter(filtered("finance")))
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn test_store_dimension_decides_whether_vectors_are_current() {
        let (pipeline, store) = pipeline(Arc::new(TermEmbedder::new()));
        let summary = pipeline.index_document(doc_a(report())).await.unwrap();

        // Claims a different size but returns vectors the index accepts.
        let claims_more = Arc::new(TermEmbedder {
            dimension: DIM * 2,
            ..TermEmbedder::new()
        });
        let again = IndexingPipeline::new(claims_more.clone(), store.clone(), &small_chunks());
        let second = again.index_document(doc_a(report())).await.unwrap();

        assert!(second.unchanged);
        assert_eq!(second.chunk_count, summary.chunk_count);
        assert_eq!(claims_more.calls(), 0);
    }
}
