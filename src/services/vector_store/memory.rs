use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::{StoredDocument, VectorStore, check_dimension};
use crate::error::VectorStoreError;
use crate::models::{CorpusStats, Document, DocumentChunk, ScoredChunk, SearchParams};
use crate::services::similarity::{compare_scores, score};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    /// Insertion sequence, used to break score ties.
    seq: u64,
    chunk: DocumentChunk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    document: Document,
    chunks: Vec<StoredChunk>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryState {
    dimension: usize,
    next_seq: u64,
    documents: BTreeMap<String, Entry>,
}

/// A state as it would be after a pending change, borrowing the live entries.
///
/// Serializes to the same shape as [`MemoryState`].
#[derive(Serialize)]
struct Candidate<'a> {
    dimension: usize,
    next_seq: u64,
    documents: BTreeMap<&'a str, &'a Entry>,
}

impl<'a> Candidate<'a> {
    fn of(state: &'a MemoryState) -> Self {
        Self {
            dimension: state.dimension,
            next_seq: state.next_seq,
            documents: state
                .documents
                .iter()
                .map(|(id, entry)| (id.as_str(), entry))
                .collect(),
        }
    }
}

/// Exact-scan vector store held in memory.
///
/// With a snapshot path every mutation is first written to a temp file and
/// renamed over the snapshot. The live state only changes after the rename,
/// so a failed write or a dropped future leaves it as it was.
pub struct InMemoryBackend {
    state: RwLock<MemoryState>,
    dimension: usize,
    snapshot: Option<PathBuf>,
}

impl InMemoryBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                dimension,
                ..Default::default()
            }),
            dimension,
            snapshot: None,
        }
    }

    /// Load (or start) an index persisted at `path`.
    pub async fn with_snapshot(path: &Path, dimension: usize) -> Result<Self, VectorStoreError> {
        let state = match tokio::fs::read(path).await {
            Ok(bytes) => {
                let state: MemoryState = serde_json::from_slice(&bytes).map_err(|e| {
                    VectorStoreError::SchemaError(format!(
                        "corrupt snapshot {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                if state.dimension != dimension {
                    return Err(VectorStoreError::DimensionMismatch {
                        expected: dimension,
                        actual: state.dimension,
                    });
                }
                tracing::debug!(
                    path = %path.display(),
                    documents = state.documents.len(),
                    "loaded index snapshot"
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryState {
                dimension,
                ..Default::default()
            },
            Err(e) => {
                return Err(VectorStoreError::ConnectionError(format!(
                    "cannot read snapshot {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(Self {
            state: RwLock::new(state),
            dimension,
            snapshot: Some(path.to_path_buf()),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    /// Write `candidate` over the snapshot.
    ///
    /// The rename is the only step after the last await, so once this returns
    /// `Ok` the caller can apply the change without another suspension point.
    async fn persist(&self, candidate: &Candidate<'_>) -> Result<(), VectorStoreError> {
        let Some(ref path) = self.snapshot else {
            return Ok(());
        };

        let bytes = serde_json::to_vec(candidate)
            .map_err(|e| VectorStoreError::WriteFailure(e.to_string()))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VectorStoreError::WriteFailure(e.to_string()))?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| VectorStoreError::WriteFailure(format!("{}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| VectorStoreError::WriteFailure(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryBackend {
    async fn ensure_schema(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        Ok(true)
    }

    async fn upsert_chunks(
        &self,
        document: &Document,
        chunks: Vec<DocumentChunk>,
    ) -> Result<(), VectorStoreError> {
        for chunk in &chunks {
            check_dimension(self.dimension, &chunk.embedding)?;
        }

        let mut state = self.state.write().await;
        let first_seq = state.next_seq;
        let next_seq = first_seq + chunks.len() as u64;

        let stored: Vec<StoredChunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| StoredChunk {
                seq: first_seq + i as u64,
                chunk,
            })
            .collect();
        // Text lives in the chunks; the record keeps only descriptive fields.
        let entry = Entry {
            document: Document {
                content: String::new(),
                ..document.clone()
            },
            chunks: stored,
        };

        if self.snapshot.is_some() {
            let mut candidate = Candidate::of(&state);
            candidate.next_seq = next_seq;
            candidate.documents.insert(&document.id, &entry);
            self.persist(&candidate).await?;
        }

        state.next_seq = next_seq;
        state.documents.insert(document.id.clone(), entry);

        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        check_dimension(self.dimension, query)?;
        if params.limit == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let mut hits: Vec<(f32, u64, &DocumentChunk)> = state
            .documents
            .values()
            .filter(|entry| params.filter.matches_document(&entry.document))
            .flat_map(|entry| entry.chunks.iter())
            .filter(|stored| params.filter.matches_chunk(&stored.chunk))
            .map(|stored| {
                (
                    score(params.metric, query, &stored.chunk.embedding),
                    stored.seq,
                    &stored.chunk,
                )
            })
            .filter(|(s, _, _)| params.metric.passes(*s, params.threshold))
            .collect();

        hits.sort_by(|a, b| compare_scores(params.metric, a.0, b.0).then(a.1.cmp(&b.1)));
        hits.truncate(params.limit);

        Ok(hits
            .into_iter()
            .map(|(score, _, chunk)| ScoredChunk {
                chunk: chunk.clone(),
                score,
            })
            .collect())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), VectorStoreError> {
        let mut state = self.state.write().await;
        if !state.documents.contains_key(document_id) {
            return Err(VectorStoreError::NotFound(document_id.to_string()));
        }

        if self.snapshot.is_some() {
            let mut candidate = Candidate::of(&state);
            candidate.documents.remove(document_id);
            self.persist(&candidate).await?;
        }

        state.documents.remove(document_id);
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, VectorStoreError> {
        let state = self.state.read().await;
        Ok(state.documents.get(document_id).map(|e| e.document.clone()))
    }

    async fn list_documents(&self) -> Result<Vec<StoredDocument>, VectorStoreError> {
        let state = self.state.read().await;
        let mut docs: Vec<StoredDocument> = state
            .documents
            .values()
            .map(|e| StoredDocument {
                document: e.document.clone(),
                chunk_count: e.chunks.len(),
            })
            .collect();
        docs.sort_by(|a, b| a.document.path.cmp(&b.document.path));
        Ok(docs)
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>, VectorStoreError> {
        let state = self.state.read().await;
        let mut chunks: Vec<DocumentChunk> = state
            .documents
            .get(document_id)
            .map(|e| e.chunks.iter().map(|s| s.chunk.clone()).collect())
            .unwrap_or_default();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn stats(&self) -> Result<CorpusStats, VectorStoreError> {
        let state = self.state.read().await;

        let mut stats = CorpusStats {
            total_documents: state.documents.len() as u64,
            ..Default::default()
        };
        let mut total_chars = 0u64;

        for entry in state.documents.values() {
            stats.total_size_bytes += entry.document.size_bytes;
            stats.total_chunks += entry.chunks.len() as u64;
            total_chars += entry
                .chunks
                .iter()
                .map(|s| s.chunk.content.chars().count() as u64)
                .sum::<u64>();
            if !entry.chunks.is_empty() && entry.chunks.iter().all(|s| s.chunk.has_embedding()) {
                stats.documents_with_embeddings += 1;
            }
        }

        if stats.total_chunks > 0 {
            stats.average_chunk_size = total_chars as f64 / stats.total_chunks as f64;
        }

        Ok(stats)
    }

    async fn clear(&self) -> Result<(), VectorStoreError> {
        let mut state = self.state.write().await;

        if self.snapshot.is_some() {
            let mut candidate = Candidate::of(&state);
            candidate.documents.clear();
            self.persist(&candidate).await?;
        }

        state.documents.clear();
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
