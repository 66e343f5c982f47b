//! Embedding provider abstraction and the remote HTTP adapter.
//!
//! The [`Embedder`] trait is the seam the ingestion coordinator and the
//! ranker work against; [`RemoteEmbedder`] implements it over an
//! OpenAI-compatible `POST /embeddings` endpoint.
//!
//! The adapter's contract mirrors what the external providers actually
//! do in production:
//!
//! - Texts are batched up to `embedding.batch_size` per call.
//! - An oversize rejection for a batch falls back to embedding each
//!   member individually; a text that is rejected on its own comes back
//!   as `None` (callers treat it as a skip, never a crash).
//! - HTTP 429 sleeps for the configured fixed cooldown and retries the
//!   same batch.
//! - Server errors and network failures retry with exponential backoff
//!   (1s, 2s, 4s, … capped at 32s), bounded by `max_retries`.
//! - Other 4xx responses fail immediately.
//!
//! Also provides the vector utilities used by the SQLite store:
//! [`vec_to_blob`], [`blob_to_vec`], and [`cosine_similarity`].

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Phrases an oversize rejection is recognized by in a 400 body.
const OVERSIZE_MARKERS: &[&str] = &["maximum context length", "too large", "reduce the length"];

/// Errors from the embedding adapter.
///
/// Callers must distinguish [`EmbedError::Oversize`] (split or skip)
/// from [`EmbedError::RateLimited`] (back off) from transient failures;
/// the ingestion coordinator branches on exactly these classes.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("input exceeds the embedding model's context window")]
    Oversize,

    #[error("embedding API rate limit persisted past {retries} retries")]
    RateLimited { retries: u32 },

    #[error("embedding API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed embedding response: {0}")]
    Response(String),

    #[error("invalid embedding configuration: {0}")]
    Config(String),
}

/// Interface every embedding backend implements.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts.
    ///
    /// Returns one entry per input, in input order. `None` marks a text
    /// the provider definitively rejected as oversize even on its own.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, EmbedError>;
}

/// Embed a single query text, which must produce a vector.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbedError> {
    let texts = [text.to_string()];
    let mut out = embedder.embed(&texts).await?;
    out.pop().flatten().ok_or(EmbedError::Oversize)
}

/// Build the configured embedder, or `None` when the provider is
/// disabled (keyword-only corpora).
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Option<Box<dyn Embedder>>, EmbedError> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "remote" => Ok(Some(Box::new(RemoteEmbedder::new(config)?))),
        other => Err(EmbedError::Config(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

/// Embedding client for an OpenAI-compatible HTTP API.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
    api_key: String,
    model: String,
    dims: usize,
}

impl RemoteEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| EmbedError::Config("embedding.model is required".into()))?;
        let dims = config
            .dims
            .ok_or_else(|| EmbedError::Config("embedding.dims is required".into()))?;

        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            EmbedError::Config(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
            model,
            dims,
        })
    }

    /// One batch request with the full retry ladder.
    async fn call(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<EmbedError> = None;

        for attempt in 0..=self.config.max_retries {
            // Exponential backoff for transient failures only; rate
            // limits already slept for their fixed cooldown below.
            if attempt > 0 && matches!(last_err, Some(EmbedError::Api { .. } | EmbedError::Http(_)))
            {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embeddings_response(&json, texts.len());
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    if status.as_u16() == 400 && is_oversize_message(&body_text) {
                        return Err(EmbedError::Oversize);
                    }

                    if status.as_u16() == 429 {
                        tracing::warn!(
                            cooldown_secs = self.config.cooldown_secs,
                            "embedding API rate limited, cooling down"
                        );
                        tokio::time::sleep(Duration::from_secs(self.config.cooldown_secs)).await;
                        last_err = Some(EmbedError::RateLimited {
                            retries: self.config.max_retries,
                        });
                        continue;
                    }

                    if status.is_server_error() {
                        tracing::debug!(status = status.as_u16(), "embedding API server error");
                        last_err = Some(EmbedError::Api {
                            status: status.as_u16(),
                            message: body_text,
                        });
                        continue;
                    }

                    // Client error other than rate limit: not retryable.
                    return Err(EmbedError::Api {
                        status: status.as_u16(),
                        message: body_text,
                    });
                }
                Err(e) => {
                    tracing::debug!(error = %e, "embedding request failed");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or(EmbedError::RateLimited {
            retries: self.config.max_retries,
        }))
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.batch_size.max(1)) {
            match self.call(batch).await {
                Ok(vectors) => out.extend(vectors.into_iter().map(Some)),
                Err(EmbedError::Oversize) if batch.len() > 1 => {
                    // Some member of the batch blew the context window;
                    // retry one at a time so the rest still embed.
                    tracing::debug!(
                        batch_len = batch.len(),
                        "oversize batch, retrying members individually"
                    );
                    for text in batch {
                        match self.call(std::slice::from_ref(text)).await {
                            Ok(mut v) => out.push(v.pop()),
                            Err(EmbedError::Oversize) => {
                                tracing::warn!(
                                    words = text.split_whitespace().count(),
                                    "text rejected as oversize, returning null entry"
                                );
                                out.push(None);
                            }
                            Err(e) => return Err(e),
                        }
                    }
                }
                Err(EmbedError::Oversize) => out.push(None),
                Err(e) => return Err(e),
            }
        }

        Ok(out)
    }
}

fn is_oversize_message(body: &str) -> bool {
    let lower = body.to_lowercase();
    OVERSIZE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Parse `{ "data": [ { "embedding": [...] }, ... ] }`, checking the
/// entry count matches the request.
fn parse_embeddings_response(
    json: &serde_json::Value,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::Response("missing data array".into()))?;

    if data.len() != expected {
        return Err(EmbedError::Response(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbedError::Response("missing embedding".into()))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or
/// mismatched-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_parse_response() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2] },
                { "embedding": [0.3, 0.4] },
            ]
        });
        let out = parse_embeddings_response(&json, 2).unwrap();
        assert_eq!(out.len(), 2);
        assert!((out[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_parse_response_count_mismatch() {
        let json = serde_json::json!({ "data": [ { "embedding": [0.1] } ] });
        assert!(parse_embeddings_response(&json, 2).is_err());
    }

    #[test]
    fn test_oversize_detection() {
        assert!(is_oversize_message(
            "This model's maximum context length is 8192 tokens"
        ));
        assert!(!is_oversize_message("invalid api key"));
    }
}
