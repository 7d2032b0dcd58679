//! Embedding gateway abstraction
//!
//! Turns a text string into a fixed-dimension vector. Failures surface as
//! `AppError::EmbeddingError` / `AppError::EmbeddingTimeout`; the caller
//! decides whether a failed variant aborts the request.

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Client for the embedding gateway
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    timeout: Duration,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
    dimension: usize,
}

impl HttpEmbedder {
    /// Create a new gateway client
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            timeout,
            max_retries: config.max_retries,
        })
    }

    /// Make request with retry
    async fn request_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let attempts = self.max_retries + 1;
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::EmbeddingError {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, text: &str) -> Result<Vec<f32>> {
        let mut request = self.client.post(&self.endpoint).json(&EmbedRequest { text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::EmbeddingTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                AppError::EmbeddingError {
                    message: format!("Request failed: {}", e),
                }
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AppError::EmbeddingError {
            message: format!("Failed to read response: {}", e),
        })?;
        let result = parse_embedding(status, &body)?;

        if result.dimension != self.dimension {
            tracing::debug!(
                expected = self.dimension,
                actual = result.dimension,
                "Embedding dimension differs from configuration"
            );
        }

        Ok(result.embedding)
    }
}

/// Validate a gateway reply: success status, JSON body, and an embedding
/// whose length matches its declared dimension
fn parse_embedding(status: reqwest::StatusCode, body: &str) -> Result<EmbedResponse> {
    if !status.is_success() {
        return Err(AppError::EmbeddingError {
            message: format!("API error {}: {}", status, body),
        });
    }

    let result: EmbedResponse =
        serde_json::from_str(body).map_err(|e| AppError::EmbeddingError {
            message: format!("Failed to parse response: {}", e),
        })?;

    if result.embedding.is_empty() || result.embedding.len() != result.dimension {
        return Err(AppError::EmbeddingError {
            message: format!(
                "Malformed embedding: {} values for declared dimension {}",
                result.embedding.len(),
                result.dimension
            ),
        });
    }

    Ok(result)
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let result = self.request_with_retry(text).await;
        metrics::record_embedding(start.elapsed().as_secs_f64(), &self.model, result.is_ok());
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mock embedder for testing
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        Ok((0..self.dimension).map(|_| rng.gen::<f32>()).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpEmbedder::new(config)?)),
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new(768);
        let embedding = embedder.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 768);
    }

    #[test]
    fn test_create_embedder_rejects_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "carrier-pigeon".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_embedder(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_embedding_failure() {
        let config = EmbeddingConfig {
            endpoint: "http://127.0.0.1:9/embed".to_string(),
            max_retries: 0,
            timeout_secs: 2,
            ..EmbeddingConfig::default()
        };
        let embedder = HttpEmbedder::new(&config).unwrap();
        let err = embedder.embed("salah").await.unwrap_err();
        assert!(err.is_embedding_failure());
    }

    #[test]
    fn test_parse_embedding_accepts_matching_dimension() {
        let result = parse_embedding(
            reqwest::StatusCode::OK,
            r#"{"embedding":[0.1,0.2,0.3],"dimension":3}"#,
        )
        .unwrap();
        assert_eq!(result.embedding, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_parse_embedding_rejects_bad_replies() {
        let cases = [
            (reqwest::StatusCode::INTERNAL_SERVER_ERROR, r#"{"embedding":[0.1],"dimension":1}"#),
            (reqwest::StatusCode::OK, "<html>upstream timeout</html>"),
            (reqwest::StatusCode::OK, r#"{"vector":[0.1],"dimension":1}"#),
            (reqwest::StatusCode::OK, r#"{"embedding":[0.1,0.2],"dimension":3}"#),
            (reqwest::StatusCode::OK, r#"{"embedding":[],"dimension":0}"#),
        ];
        for (status, body) in cases {
            let err = tokio_test::assert_err!(parse_embedding(status, body));
            assert!(matches!(err, AppError::EmbeddingError { .. }), "{}: {}", status, body);
        }
    }
}
