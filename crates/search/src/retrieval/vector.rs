//! HTTP vector index backend
//!
//! Posts `{vector, topK, namespace?}` and reads `{matches: [{id, score, metadata}]}`.

use super::{IndexMatch, IndexQuery, IndexResponse, VectorIndex};
use citeforge_common::errors::{AppError, Result};
use std::time::Duration;

/// Vector index reached over HTTP
pub struct HttpVectorIndex {
    client: reqwest::Client,
    name: String,
    url: String,
    api_key: Option<String>,
}

impl HttpVectorIndex {
    /// Create a new HTTP index backend
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            name: name.into(),
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>> {
        let mut request = self.client.post(&self.url).json(query);
        if let Some(key) = &self.api_key {
            request = request.header("Api-Key", key);
        }

        let response = request.send().await.map_err(|e| AppError::IndexBackend {
            knowledge_base: self.name.clone(),
            message: format!("Request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::IndexBackend {
                knowledge_base: self.name.clone(),
                message: format!("API error {}: {}", status, body),
            });
        }

        let body: IndexResponse = response.json().await.map_err(|e| AppError::IndexBackend {
            knowledge_base: self.name.clone(),
            message: format!("Failed to parse response: {}", e),
        })?;

        Ok(body.matches)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
