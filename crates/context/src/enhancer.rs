//! Query enhancement
//!
//! Turns the user's message and the conversation so far into a fixed number
//! of search-query variants (translation, expansion). The gateway may fail;
//! `QueryEnhancer` never does.

use async_trait::async_trait;
use citeforge_common::config::EnhancementConfig;
use citeforge_common::errors::{AppError, Result};
use citeforge_common::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Request body of the enhancement gateway
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementRequest<'a> {
    pub query: &'a str,
    pub history: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_hint: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnhancementResponse {
    improved_queries: Vec<String>,
}

/// Raw transport to the query enhancement service
#[async_trait]
pub trait EnhancementGateway: Send + Sync {
    async fn improve(&self, request: &EnhancementRequest<'_>) -> Result<Vec<String>>;
}

/// Enhancement gateway reached over HTTP
pub struct HttpEnhancementGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpEnhancementGateway {
    pub fn new(config: &EnhancementConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl EnhancementGateway for HttpEnhancementGateway {
    async fn improve(&self, request: &EnhancementRequest<'_>) -> Result<Vec<String>> {
        let mut call = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(|e| AppError::EnhancementGateway {
            message: format!("Request failed: {}", e),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AppError::EnhancementGateway {
            message: format!("Failed to read response: {}", e),
        })?;
        parse_improved_queries(status, &body)
    }
}

/// Improved queries from a gateway reply; non-success or malformed bodies fail
fn parse_improved_queries(status: reqwest::StatusCode, body: &str) -> Result<Vec<String>> {
    if !status.is_success() {
        return Err(AppError::EnhancementGateway {
            message: format!("API error {}: {}", status, body),
        });
    }

    let parsed: EnhancementResponse =
        serde_json::from_str(body).map_err(|e| AppError::EnhancementGateway {
            message: format!("Failed to parse response: {}", e),
        })?;

    Ok(parsed.improved_queries)
}

/// Produces exactly `variant_count` search queries for every message
#[derive(Clone)]
pub struct QueryEnhancer {
    gateway: Arc<dyn EnhancementGateway>,
    variant_count: usize,
}

impl QueryEnhancer {
    pub fn new(gateway: Arc<dyn EnhancementGateway>, variant_count: usize) -> Self {
        Self {
            gateway,
            variant_count: variant_count.max(1),
        }
    }

    pub fn variant_count(&self) -> usize {
        self.variant_count
    }

    /// Improve a query. Gateway failures fall back to copies of the query.
    pub async fn improve_queries(
        &self,
        query: &str,
        history: &str,
        model_hint: Option<&str>,
    ) -> Vec<String> {
        let request = EnhancementRequest { query, history, model_hint };

        match self.gateway.improve(&request).await {
            Ok(improved) => {
                let variants = self.fit(query, improved);
                debug!(variants = ?variants, "Queries enhanced");
                variants
            }
            Err(e) => {
                warn!(error = %e, "Query enhancement failed, searching with the original query");
                metrics::record_enhancement_fallback("gateway_error");
                self.fallback(query)
            }
        }
    }

    /// N copies of the original query
    pub fn fallback(&self, query: &str) -> Vec<String> {
        vec![query.to_string(); self.variant_count]
    }

    /// Force a gateway answer to exactly N non-blank variants
    fn fit(&self, query: &str, improved: Vec<String>) -> Vec<String> {
        if improved.len() != self.variant_count {
            debug!(
                expected = self.variant_count,
                received = improved.len(),
                "Enhancement gateway returned unexpected arity"
            );
            metrics::record_enhancement_fallback("arity_mismatch");
        }

        let mut variants: Vec<String> = improved
            .into_iter()
            .take(self.variant_count)
            .map(|v| {
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    query.to_string()
                } else {
                    trimmed.to_string()
                }
            })
            .collect();
        variants.resize(self.variant_count, query.to_string());
        variants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGateway(Vec<String>);

    #[async_trait]
    impl EnhancementGateway for FixedGateway {
        async fn improve(&self, _request: &EnhancementRequest<'_>) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    struct DownGateway;

    #[async_trait]
    impl EnhancementGateway for DownGateway {
        async fn improve(&self, _request: &EnhancementRequest<'_>) -> Result<Vec<String>> {
            Err(AppError::EnhancementGateway { message: "connection refused".into() })
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_unreachable_gateway_falls_back() {
        let enhancer = QueryEnhancer::new(Arc::new(DownGateway), 3);
        let variants = enhancer.improve_queries("prayer", "", None).await;
        assert_eq!(variants, strings(&["prayer", "prayer", "prayer"]));
    }

    #[tokio::test]
    async fn test_gateway_answer_used() {
        let enhancer = QueryEnhancer::new(
            Arc::new(FixedGateway(strings(&["prayer times", "salah", "namaz rules"]))),
            3,
        );
        let variants = enhancer.improve_queries("prayer", "earlier text", Some("fast")).await;
        assert_eq!(variants, strings(&["prayer times", "salah", "namaz rules"]));
    }

    #[tokio::test]
    async fn test_arity_is_enforced() {
        let short = QueryEnhancer::new(Arc::new(FixedGateway(strings(&["salah", "  "]))), 3);
        assert_eq!(
            short.improve_queries("prayer", "", None).await,
            strings(&["salah", "prayer", "prayer"])
        );

        let long = QueryEnhancer::new(Arc::new(FixedGateway(strings(&["a", "b", "c", "d"]))), 2);
        assert_eq!(long.improve_queries("q", "", None).await, strings(&["a", "b"]));
    }

    #[test]
    fn test_request_wire_format() {
        let request = EnhancementRequest { query: "q", history: "h", model_hint: Some("m") };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["modelHint"], "m");
        assert_eq!(json["history"], "h");
    }

    #[tokio::test]
    async fn test_http_gateway_failure_falls_back() {
        let config = EnhancementConfig {
            endpoint: "http://127.0.0.1:9/improve".into(),
            timeout_secs: 2,
            ..EnhancementConfig::default()
        };
        let gateway = HttpEnhancementGateway::new(&config).unwrap();
        let enhancer = QueryEnhancer::new(Arc::new(gateway), config.variant_count);
        assert_eq!(
            enhancer.improve_queries("dua", "", None).await,
            strings(&["dua", "dua", "dua"])
        );
    }

    #[test]
    fn test_parse_improved_queries() {
        let parsed = parse_improved_queries(
            reqwest::StatusCode::OK,
            r#"{"improvedQueries":["salah times","prayer"]}"#,
        )
        .unwrap();
        assert_eq!(parsed, strings(&["salah times", "prayer"]));
    }

    #[test]
    fn test_bad_replies_are_gateway_errors() {
        let cases = [
            (reqwest::StatusCode::BAD_GATEWAY, r#"{"improvedQueries":["x"]}"#),
            (reqwest::StatusCode::OK, "not json"),
            (reqwest::StatusCode::OK, r#"{"queries":["x"]}"#),
        ];
        for (status, body) in cases {
            assert!(matches!(
                parse_improved_queries(status, body),
                Err(AppError::EnhancementGateway { .. })
            ));
        }
    }

    /// Gateway replying with a fixed raw body, as if parsing it off the wire
    struct RawReplyGateway(reqwest::StatusCode, &'static str);

    #[async_trait]
    impl EnhancementGateway for RawReplyGateway {
        async fn improve(&self, _request: &EnhancementRequest<'_>) -> Result<Vec<String>> {
            parse_improved_queries(self.0, self.1)
        }
    }

    #[tokio::test]
    async fn test_malformed_reply_falls_back_to_copies() {
        let enhancer = QueryEnhancer::new(
            Arc::new(RawReplyGateway(reqwest::StatusCode::OK, r#"{"answer":"no"}"#)),
            3,
        );
        assert_eq!(
            enhancer.improve_queries("zakat", "", None).await,
            strings(&["zakat", "zakat", "zakat"])
        );
    }
}
