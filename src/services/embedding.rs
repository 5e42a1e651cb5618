//! Embedding clients.
//!
//! [`Embedder`] is the seam the indexing pipeline and retrieval service depend
//! on; [`HttpEmbeddingClient`] talks to an external model server.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::EmbeddingError;
use crate::models::{EmbeddingApi, EmbeddingConfig, EmbeddingServiceInfo};
use crate::utils::retry::{RetryConfig, with_retry};

/// Produces fixed-dimension vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed many texts. The output has the same length and order as `texts`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::MalformedResponse("empty embedding response".to_string()))
    }

    /// Configured vector dimension.
    fn dimension(&self) -> usize;

    fn model(&self) -> &str;

    fn endpoint(&self) -> &str;
}

/// Check a provider response: one vector per input, each of `dimension` finite values.
pub fn validate_embeddings(
    expected_count: usize,
    dimension: usize,
    embeddings: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if embeddings.len() != expected_count {
        return Err(EmbeddingError::CountMismatch {
            expected: expected_count,
            actual: embeddings.len(),
        });
    }
    for vector in &embeddings {
        if vector.len() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::MalformedResponse(
                "embedding contains non-finite values".to_string(),
            ));
        }
    }
    Ok(embeddings)
}

/// Embed a probe text and report connectivity and dimension.
pub async fn probe_embedder(embedder: &dyn Embedder) -> EmbeddingServiceInfo {
    let start = Instant::now();
    let result = embedder.embed("connectivity check").await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let (reachable, dimension, error) = match result {
        Ok(vector) => (true, Some(vector.len()), None),
        Err(EmbeddingError::DimensionMismatch { actual, .. }) => (
            true,
            Some(actual),
            Some(format!(
                "model returned {} dimensions, expected {}",
                actual,
                embedder.dimension()
            )),
        ),
        Err(e) => (false, None, Some(e.to_string())),
    };

    EmbeddingServiceInfo {
        reachable,
        endpoint: embedder.endpoint().to_string(),
        model: embedder.model().to_string(),
        expected_dimension: embedder.dimension(),
        dimension,
        latency_ms,
        error,
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct TeiRequest<'a> {
    inputs: &'a [String],
    truncate: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

/// Decode a response body for `api` into vectors in input order.
fn parse_response(api: EmbeddingApi, body: &str) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let malformed = |e: serde_json::Error| EmbeddingError::MalformedResponse(e.to_string());
    match api {
        EmbeddingApi::Ollama => serde_json::from_str::<OllamaResponse>(body)
            .map(|r| r.embeddings)
            .map_err(malformed),
        EmbeddingApi::Tei => serde_json::from_str::<Vec<Vec<f32>>>(body).map_err(malformed),
        EmbeddingApi::OpenAi => {
            let mut data = serde_json::from_str::<OpenAiResponse>(body)
                .map_err(malformed)?
                .data;
            // entries may arrive out of order
            data.sort_by_key(|d| d.index);
            Ok(data.into_iter().map(|d| d.embedding).collect())
        }
    }
}

/// HTTP client for Ollama, TEI and OpenAI-compatible embedding servers.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    api: EmbeddingApi,
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            api: config.api,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension as usize,
            batch_size: (config.batch_size as usize).max(1),
            api_key: config.api_key.clone(),
            retry: RetryConfig::new(config.max_attempts),
        })
    }

    pub fn with_defaults() -> Result<Self, EmbeddingError> {
        Self::new(&EmbeddingConfig::default())
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the endpoint with a one-word request.
    pub async fn test_connection(&self) -> EmbeddingServiceInfo {
        probe_embedder(self).await
    }

    fn request_url(&self) -> String {
        match self.api {
            EmbeddingApi::Ollama => format!("{}/api/embed", self.base_url),
            EmbeddingApi::Tei => format!("{}/embed", self.base_url),
            EmbeddingApi::OpenAi if self.base_url.ends_with("/v1") => {
                format!("{}/embeddings", self.base_url)
            }
            EmbeddingApi::OpenAi => format!("{}/v1/embeddings", self.base_url),
        }
    }

    /// One HTTP round trip for one batch.
    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut request = self.client.post(self.request_url());
        request = match self.api {
            EmbeddingApi::Ollama => request.json(&OllamaRequest {
                model: &self.model,
                input: texts,
            }),
            EmbeddingApi::Tei => request.json(&TeiRequest {
                inputs: texts,
                truncate: true,
            }),
            EmbeddingApi::OpenAi => request.json(&OpenAiRequest {
                model: &self.model,
                input: texts,
            }),
        };
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Unavailable(format!(
                "status {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        parse_response(self.api, &body)
    }
}

#[async_trait]
impl Embedder for HttpEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::debug!(batch = batch_no, size = batch.len(), "requesting embeddings");
            let embeddings = with_retry(&self.retry, "embed_batch", || self.request_batch(batch))
                .await
                .into_result()?;
            all_embeddings.extend(validate_embeddings(batch.len(), self.dimension, embeddings)?);
        }

        Ok(all_embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}
