use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use tokio::sync::OnceCell;

use super::{StoredDocument, VectorStore, check_dimension};
use crate::error::VectorStoreError;
use crate::models::{
    CorpusStats, Document, DocumentChunk, MetadataValue, ScoredChunk, SearchFilter, SearchParams,
    SimilarityMetric, Tag, VectorStoreConfig,
};

const DOCUMENT_COLUMNS: &str = "d.id, d.path, d.title, d.file_type, d.size_bytes, d.checksum, \
     d.metadata::text AS metadata, d.tags, d.created_at, d.updated_at";

const CHUNK_COLUMNS: &str = "c.id::text AS chunk_id, c.document_id, c.chunk_index, c.content, \
     c.token_count, c.start_offset, c.end_offset, c.line_start, c.line_end, c.keywords, c.embedding";

fn write_err(e: sqlx::Error) -> VectorStoreError {
    VectorStoreError::WriteFailure(e.to_string())
}

fn search_err(e: sqlx::Error) -> VectorStoreError {
    VectorStoreError::SearchError(e.to_string())
}

fn schema_err(e: sqlx::Error) -> VectorStoreError {
    VectorStoreError::SchemaError(e.to_string())
}

/// PostgreSQL + pgvector backend.
///
/// Documents and chunks live in two tables; chunks reference their document
/// with `ON DELETE CASCADE`. Writes for one document run in a single
/// transaction guarded by an advisory lock on the document id.
pub struct PgVectorBackend {
    pool: PgPool,
    schema: Option<String>,
    table_prefix: String,
    documents_table: String,
    chunks_table: String,
    dimension: usize,
    /// Whether the installed pgvector can resume an HNSW scan past `ef_search`.
    iterative_scan: OnceCell<bool>,
}

/// HNSW candidate list size used for filtered searches.
const MIN_EF_SEARCH: usize = 40;
const MAX_EF_SEARCH: usize = 1000;

impl PgVectorBackend {
    pub async fn connect(
        config: &VectorStoreConfig,
        dimension: usize,
    ) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout.into()))
            .connect(&config.url)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            pool,
            schema: config.schema.clone(),
            table_prefix: config.table_prefix.clone(),
            documents_table: config.qualified_table_name("documents"),
            chunks_table: config.qualified_table_name("chunks"),
            dimension,
            iterative_scan: OnceCell::new(),
        })
    }

    async fn check_pgvector_extension(&self) -> Result<(), VectorStoreError> {
        // Creating the extension needs privileges; an existing one is enough.
        if let Err(e) = sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
        {
            tracing::debug!(error = %e, "could not create pgvector extension");
        }

        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname::text FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(schema_err)?;

        if result.is_none() {
            return Err(VectorStoreError::PgVectorExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    async fn supports_iterative_scan(&self) -> bool {
        *self
            .iterative_scan
            .get_or_init(|| async {
                let version: Option<(String,)> = sqlx::query_as(
                    "SELECT extversion::text FROM pg_extension WHERE extname = 'vector'",
                )
                .fetch_optional(&self.pool)
                .await
                .unwrap_or_else(|e| {
                    tracing::debug!(error = %e, "could not read pgvector version");
                    None
                });
                let supported = version.is_some_and(|(v,)| has_iterative_scan(&v));
                tracing::debug!(supported, "pgvector iterative index scans");
                supported
            })
            .await
    }

    /// Dimension of an existing chunks table, if there is one.
    async fn existing_dimension(&self) -> Result<Option<usize>, VectorStoreError> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT atttypmod FROM pg_attribute \
             WHERE attrelid = to_regclass($1::text) AND attname = 'embedding'",
        )
        .bind(&self.chunks_table)
        .fetch_optional(&self.pool)
        .await
        .map_err(schema_err)?;

        Ok(row.map(|(typmod,)| typmod as usize))
    }

    async fn lock_document(
        tx: &mut Transaction<'_, Postgres>,
        document_id: &str,
    ) -> Result<(), VectorStoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(document_id)
            .execute(&mut **tx)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    fn score_expr(metric: SimilarityMetric) -> &'static str {
        match metric {
            SimilarityMetric::Cosine => "1 - (c.embedding <=> $1)",
            SimilarityMetric::L2 => "c.embedding <-> $1",
        }
    }

    fn distance_expr(metric: SimilarityMetric) -> &'static str {
        match metric {
            SimilarityMetric::Cosine => "c.embedding <=> $1",
            SimilarityMetric::L2 => "c.embedding <-> $1",
        }
    }

    fn document_from_row(row: &PgRow) -> Result<Document, VectorStoreError> {
        let id: String = row.get("id");
        let metadata_json: String = row.get("metadata");
        let metadata = serde_json::from_str(&metadata_json).map_err(|e| {
            VectorStoreError::SchemaError(format!("corrupt metadata for {}: {}", id, e))
        })?;
        let file_type: String = row.get("file_type");
        let tags: Vec<String> = row.get("tags");
        let size_bytes: i64 = row.get("size_bytes");

        Ok(Document {
            path: row.get("path"),
            title: row.get("title"),
            file_type: file_type.parse().unwrap_or_default(),
            size_bytes: size_bytes as u64,
            checksum: row.get("checksum"),
            metadata,
            tags: tags.into_iter().filter_map(|s| s.parse::<Tag>().ok()).collect(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            content: String::new(),
            id,
        })
    }

    fn chunk_from_row(row: &PgRow) -> DocumentChunk {
        let embedding: Vector = row.get("embedding");
        let chunk_index: i32 = row.get("chunk_index");
        let token_count: i32 = row.get("token_count");
        let start_offset: i64 = row.get("start_offset");
        let end_offset: i64 = row.get("end_offset");
        let line_start: i32 = row.get("line_start");
        let line_end: i32 = row.get("line_end");

        DocumentChunk {
            id: row.get("chunk_id"),
            document_id: row.get("document_id"),
            chunk_index: chunk_index as u32,
            content: row.get("content"),
            token_count: token_count as u32,
            start_offset: start_offset as u64,
            end_offset: end_offset as u64,
            line_start: line_start as u32,
            line_end: line_end as u32,
            keywords: row.get("keywords"),
            embedding: embedding.to_vec(),
        }
    }
}

/// Bind values for the dynamic WHERE clause, in placeholder order.
enum FilterBind {
    Text(String),
    TextArray(Vec<String>),
}

/// `{"key": value}` as JSON text, for jsonb containment.
fn json_object(key: &str, value: serde_json::Value) -> String {
    let mut map = serde_json::Map::new();
    map.insert(key.to_string(), value);
    serde_json::Value::Object(map).to_string()
}

/// Translate a [`SearchFilter`] into SQL predicates starting at `$first_param`.
fn filter_clauses(filter: &SearchFilter, first_param: usize) -> (Vec<String>, Vec<FilterBind>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();
    let mut next = first_param;
    let mut param = || {
        let p = next;
        next += 1;
        p
    };

    if !filter.document_ids.is_empty() {
        clauses.push(format!("d.id = ANY(${})", param()));
        binds.push(FilterBind::TextArray(filter.document_ids.clone()));
    }
    if !filter.file_types.is_empty() {
        clauses.push(format!("d.file_type = ANY(${})", param()));
        binds.push(FilterBind::TextArray(
            filter.file_types.iter().map(|t| t.to_string()).collect(),
        ));
    }
    if !filter.tags.is_empty() {
        clauses.push(format!("d.tags @> ${}::text[]", param()));
        binds.push(FilterBind::TextArray(
            filter.tags.iter().map(|t| t.to_storage_string()).collect(),
        ));
    }
    if !filter.keywords.is_empty() {
        let keywords: Vec<String> = filter.keywords.iter().map(|k| k.to_lowercase()).collect();
        let patterns = keywords.iter().map(|k| format!("%{}%", k)).collect();
        clauses.push(format!(
            "(c.keywords && ${}::text[] OR c.content ILIKE ANY(${}))",
            param(),
            param()
        ));
        binds.push(FilterBind::TextArray(keywords));
        binds.push(FilterBind::TextArray(patterns));
    }
    for cond in &filter.metadata {
        let exact = json_object(&cond.key, serde_json::to_value(&cond.value).unwrap_or_default());
        match cond.value {
            // Lists match when they contain the requested string.
            MetadataValue::String(ref s) => {
                let member = json_object(
                    &cond.key,
                    serde_json::Value::Array(vec![serde_json::Value::String(s.clone())]),
                );
                clauses.push(format!(
                    "(d.metadata @> ${}::jsonb OR d.metadata @> ${}::jsonb)",
                    param(),
                    param()
                ));
                binds.push(FilterBind::Text(exact));
                binds.push(FilterBind::Text(member));
            }
            _ => {
                clauses.push(format!("d.metadata @> ${}::jsonb", param()));
                binds.push(FilterBind::Text(exact));
            }
        }
    }

    (clauses, binds)
}

/// pgvector 0.8 added `hnsw.iterative_scan`.
fn has_iterative_scan(version: &str) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    (major, minor) >= (0, 8)
}

/// Session settings for one search transaction.
///
/// Filters and the threshold are applied to the rows an HNSW scan yields, so
/// the scan must be allowed to go past its first `ef_search` candidates.
/// Iterative scans keep going until `limit` rows pass; older pgvector only
/// gets a wider candidate list.
fn search_settings(limit: usize, iterative_scan: bool) -> Vec<String> {
    let ef_search = limit.clamp(MIN_EF_SEARCH, MAX_EF_SEARCH);
    let mut settings = Vec::with_capacity(2);
    if iterative_scan {
        settings.push("SET LOCAL hnsw.iterative_scan = relaxed_order".to_string());
        settings.push(format!("SET LOCAL hnsw.ef_search = {}", ef_search));
    } else {
        settings.push(format!("SET LOCAL hnsw.ef_search = {}", MAX_EF_SEARCH));
    }
    settings
}

/// Nearest chunks passing `predicates`, best first with ties in insertion order.
///
/// A relaxed-order scan can return rows slightly out of order, so the
/// candidates are materialized and sorted again.
fn search_sql(
    chunks_table: &str,
    documents_table: &str,
    metric: SimilarityMetric,
    predicates: &[String],
    limit: usize,
) -> String {
    let distance = PgVectorBackend::distance_expr(metric);
    format!(
        r#"
        WITH candidates AS MATERIALIZED (
            SELECT {columns}, c.seq, {distance} AS distance, {score} AS score
            FROM {chunks} c
            JOIN {documents} d ON d.id = c.document_id
            WHERE {predicates}
            ORDER BY {distance}
            LIMIT {limit}
        )
        SELECT * FROM candidates
        ORDER BY distance, seq
        "#,
        columns = CHUNK_COLUMNS,
        distance = distance,
        score = PgVectorBackend::score_expr(metric),
        chunks = chunks_table,
        documents = documents_table,
        predicates = predicates.join(" AND "),
        limit = limit,
    )
}

#[async_trait]
impl VectorStore for PgVectorBackend {
    async fn ensure_schema(&self) -> Result<(), VectorStoreError> {
        self.check_pgvector_extension().await?;

        if let Some(ref schema) = self.schema {
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
                .execute(&self.pool)
                .await
                .map_err(schema_err)?;
        }

        if let Some(existing) = self.existing_dimension().await?
            && existing != self.dimension
        {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: existing,
            });
        }

        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    path TEXT NOT NULL,
                    title TEXT NOT NULL,
                    file_type TEXT NOT NULL,
                    size_bytes BIGINT NOT NULL,
                    checksum TEXT NOT NULL,
                    metadata JSONB NOT NULL DEFAULT '{{}}',
                    tags TEXT[] NOT NULL DEFAULT '{{}}',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
                self.documents_table
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id UUID PRIMARY KEY,
                    seq BIGSERIAL,
                    document_id TEXT NOT NULL REFERENCES {}(id) ON DELETE CASCADE,
                    chunk_index INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    token_count INTEGER NOT NULL,
                    start_offset BIGINT NOT NULL,
                    end_offset BIGINT NOT NULL,
                    line_start INTEGER NOT NULL,
                    line_end INTEGER NOT NULL,
                    keywords TEXT[] NOT NULL DEFAULT '{{}}',
                    embedding vector({}) NOT NULL,
                    UNIQUE (document_id, chunk_index)
                )
                "#,
                self.chunks_table, self.documents_table, self.dimension
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {p}_chunks_embedding_cos_idx ON {t} USING hnsw (embedding vector_cosine_ops)",
                p = self.table_prefix,
                t = self.chunks_table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {p}_chunks_embedding_l2_idx ON {t} USING hnsw (embedding vector_l2_ops)",
                p = self.table_prefix,
                t = self.chunks_table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {p}_chunks_document_id_idx ON {t} (document_id)",
                p = self.table_prefix,
                t = self.chunks_table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {p}_documents_tags_idx ON {t} USING GIN(tags)",
                p = self.table_prefix,
                t = self.documents_table
            ),
        ];

        for sql in &statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(schema_err)?;
        }

        Ok(())
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn upsert_chunks(
        &self,
        document: &Document,
        chunks: Vec<DocumentChunk>,
    ) -> Result<(), VectorStoreError> {
        for chunk in &chunks {
            check_dimension(self.dimension, &chunk.embedding)?;
        }

        let metadata = serde_json::to_string(&document.metadata)
            .map_err(|e| VectorStoreError::WriteFailure(e.to_string()))?;
        let tags: Vec<String> = document.tags.iter().map(|t| t.to_storage_string()).collect();

        let mut tx = self.pool.begin().await.map_err(write_err)?;
        Self::lock_document(&mut tx, &document.id).await?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, path, title, file_type, size_bytes, checksum, metadata, tags,
                            created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7::jsonb, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                path = EXCLUDED.path,
                title = EXCLUDED.title,
                file_type = EXCLUDED.file_type,
                size_bytes = EXCLUDED.size_bytes,
                checksum = EXCLUDED.checksum,
                metadata = EXCLUDED.metadata,
                tags = EXCLUDED.tags,
                updated_at = EXCLUDED.updated_at
            "#,
            self.documents_table
        ))
        .bind(&document.id)
        .bind(&document.path)
        .bind(&document.title)
        .bind(document.file_type.to_string())
        .bind(document.size_bytes as i64)
        .bind(&document.checksum)
        .bind(&metadata)
        .bind(&tags)
        .bind(&document.created_at)
        .bind(&document.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        sqlx::query(&format!(
            "DELETE FROM {} WHERE document_id = $1",
            self.chunks_table
        ))
        .bind(&document.id)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        let insert = format!(
            r#"
            INSERT INTO {} (id, document_id, chunk_index, content, token_count, start_offset,
                            end_offset, line_start, line_end, keywords, embedding)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
            self.chunks_table
        );

        let count = chunks.len();
        for chunk in chunks {
            let id = uuid::Uuid::parse_str(&chunk.id)
                .map_err(|e| VectorStoreError::WriteFailure(format!("invalid chunk id: {}", e)))?;

            sqlx::query(&insert)
                .bind(id)
                .bind(&chunk.document_id)
                .bind(chunk.chunk_index as i32)
                .bind(&chunk.content)
                .bind(chunk.token_count as i32)
                .bind(chunk.start_offset as i64)
                .bind(chunk.end_offset as i64)
                .bind(chunk.line_start as i32)
                .bind(chunk.line_end as i32)
                .bind(&chunk.keywords)
                .bind(Vector::from(chunk.embedding))
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
        }

        tx.commit().await.map_err(write_err)?;
        tracing::debug!(document_id = %document.id, chunks = count, "replaced chunk set");

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

        let comparison = if params.metric.higher_is_better() {
            ">="
        } else {
            "<="
        };

        let (mut predicates, binds) = filter_clauses(&params.filter, 3);
        predicates.insert(
            0,
            format!("{} {} $2", Self::score_expr(params.metric), comparison),
        );
        let sql = search_sql(
            &self.chunks_table,
            &self.documents_table,
            params.metric,
            &predicates,
            params.limit,
        );

        let iterative_scan = self.supports_iterative_scan().await;
        let mut tx = self.pool.begin().await.map_err(search_err)?;
        for setting in search_settings(params.limit, iterative_scan) {
            sqlx::query(&setting)
                .execute(&mut *tx)
                .await
                .map_err(search_err)?;
        }

        let mut query_builder = sqlx::query(&sql)
            .bind(Vector::from(query.to_vec()))
            .bind(params.threshold as f64);
        for bind in binds {
            query_builder = match bind {
                FilterBind::Text(s) => query_builder.bind(s),
                FilterBind::TextArray(v) => query_builder.bind(v),
            };
        }

        let rows = query_builder
            .fetch_all(&mut *tx)
            .await
            .map_err(search_err)?;
        tx.commit().await.map_err(search_err)?;

        Ok(rows
            .iter()
            .map(|row| {
                let score: f64 = row.get("score");
                ScoredChunk {
                    chunk: Self::chunk_from_row(row),
                    score: score as f32,
                }
            })
            .collect())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), VectorStoreError> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        Self::lock_document(&mut tx, document_id).await?;

        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = $1",
            self.documents_table
        ))
        .bind(document_id)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        if result.rows_affected() == 0 {
            return Err(VectorStoreError::NotFound(document_id.to_string()));
        }

        tx.commit().await.map_err(write_err)?;
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, VectorStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} d WHERE d.id = $1",
            DOCUMENT_COLUMNS, self.documents_table
        ))
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(search_err)?;

        row.as_ref().map(Self::document_from_row).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<StoredDocument>, VectorStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}, COUNT(c.id) AS chunk_count
            FROM {} d
            LEFT JOIN {} c ON c.document_id = d.id
            GROUP BY d.id
            ORDER BY d.path
            "#,
            DOCUMENT_COLUMNS, self.documents_table, self.chunks_table
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(search_err)?;

        rows.iter()
            .map(|row| {
                let chunk_count: i64 = row.get("chunk_count");
                Ok(StoredDocument {
                    document: Self::document_from_row(row)?,
                    chunk_count: chunk_count as usize,
                })
            })
            .collect()
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>, VectorStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} c WHERE c.document_id = $1 ORDER BY c.chunk_index",
            CHUNK_COLUMNS, self.chunks_table
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(search_err)?;

        Ok(rows.iter().map(Self::chunk_from_row).collect())
    }

    async fn stats(&self) -> Result<CorpusStats, VectorStoreError> {
        let (total_documents, total_size_bytes): (i64, i64) = sqlx::query_as(&format!(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0)::bigint FROM {}",
            self.documents_table
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(search_err)?;

        let (total_chunks, average_chunk_size, documents_with_embeddings): (i64, f64, i64) =
            sqlx::query_as(&format!(
                "SELECT COUNT(*), COALESCE(AVG(char_length(content)), 0)::float8, \
                 COUNT(DISTINCT document_id) FROM {}",
                self.chunks_table
            ))
            .fetch_one(&self.pool)
            .await
            .map_err(search_err)?;

        Ok(CorpusStats {
            total_documents: total_documents as u64,
            total_chunks: total_chunks as u64,
            average_chunk_size,
            documents_with_embeddings: documents_with_embeddings as u64,
            total_size_bytes: total_size_bytes as u64,
        })
    }

    async fn clear(&self) -> Result<(), VectorStoreError> {
        sqlx::query(&format!(
            "TRUNCATE TABLE {}, {}",
            self.chunks_table, self.documents_table
        ))
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn backend_name(&self) -> &'static str {
        "pgvector"
    }
}
