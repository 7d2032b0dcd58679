//! Configuration management for CiteForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use crate::models::KnowledgeBase;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Embedding gateway configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Query enhancement gateway configuration
    #[serde(default)]
    pub enhancement: EnhancementConfig,

    /// Search fan-out and filtering
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Context store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Knowledge bases in any order; citation order follows `priority_rank`
    #[serde(default)]
    pub knowledge_bases: Vec<KnowledgeBaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: http, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Gateway endpoint accepting `{text}` and returning `{embedding, dimension}`
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    /// API key for the gateway
    pub api_key: Option<String>,

    /// Model label used in logs and metrics
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Expected embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnhancementConfig {
    /// Gateway endpoint accepting `{query, history, modelHint}`
    #[serde(default = "default_enhancement_endpoint")]
    pub endpoint: String,

    /// API key for the gateway
    pub api_key: Option<String>,

    /// Number of query variants every request searches with
    #[serde(default = "default_variant_count")]
    pub variant_count: usize,

    /// Request timeout in seconds
    #[serde(default = "default_enhancement_timeout")]
    pub timeout_secs: u64,
}

/// What to do when a query variant cannot be embedded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingFailurePolicy {
    /// Fail the whole request
    #[default]
    Abort,
    /// Drop that variant's searches and continue with the rest
    SkipVariant,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Results requested per search call (the index client asks for twice this)
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub embedding_failure_policy: EmbeddingFailurePolicy,

    /// Timeout for a single namespace search in seconds
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis URL, required for the redis backend
    pub redis_url: Option<String>,

    /// Key prefix for namespacing
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Entry TTL in seconds; 0 keeps entries until evicted externally
    #[serde(default)]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

/// A knowledge base together with the index it lives in
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KnowledgeBaseConfig {
    #[serde(flatten)]
    pub definition: KnowledgeBase,

    /// Vector index query endpoint
    pub index_url: String,

    /// API key for the index backend
    pub index_api_key: Option<String>,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_embedding_provider() -> String { "http".to_string() }
fn default_embedding_endpoint() -> String { "http://localhost:8001/embed".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 1536 }
fn default_embedding_timeout() -> u64 { 15 }
fn default_embedding_retries() -> u32 { 2 }
fn default_enhancement_endpoint() -> String { "http://localhost:8002/improve".to_string() }
fn default_variant_count() -> usize { 3 }
fn default_enhancement_timeout() -> u64 { 10 }
fn default_top_k() -> usize { 5 }
fn default_search_timeout() -> u64 { 10 }
fn default_key_prefix() -> String { "citeforge:context".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "citeforge".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            endpoint: default_embedding_endpoint(),
            api_key: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            endpoint: default_enhancement_endpoint(),
            api_key: None,
            variant_count: default_variant_count(),
            timeout_secs: default_enhancement_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            embedding_failure_policy: EmbeddingFailurePolicy::default(),
            search_timeout_secs: default_search_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: None,
            key_prefix: default_key_prefix(),
            ttl_secs: 0,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__TOP_K=8
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize::<Self>()?.validated()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize::<Self>()?.validated()
    }

    /// Reject settings the pipeline cannot run with
    fn validated(self) -> Result<Self, ConfigError> {
        if self.enhancement.variant_count == 0 {
            return Err(ConfigError::Message(
                "enhancement.variant_count must be at least 1".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Message("retrieval.top_k must be at least 1".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for kb in &self.knowledge_bases {
            if !seen.insert(kb.definition.id.clone()) {
                return Err(ConfigError::Message(format!(
                    "duplicate knowledge base id '{}'",
                    kb.definition.id
                )));
            }
        }
        Ok(self)
    }

    /// Knowledge base definitions sorted by priority
    pub fn knowledge_bases_by_priority(&self) -> Vec<&KnowledgeBaseConfig> {
        let mut kbs: Vec<&KnowledgeBaseConfig> = self.knowledge_bases.iter().collect();
        kbs.sort_by_key(|kb| kb.definition.priority_rank);
        kbs
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.search_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            embedding: EmbeddingConfig::default(),
            enhancement: EnhancementConfig::default(),
            retrieval: RetrievalConfig::default(),
            store: StoreConfig::default(),
            observability: ObservabilityConfig::default(),
            knowledge_bases: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_SCORE_THRESHOLD;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.enhancement.variant_count, 3);
        assert_eq!(config.retrieval.embedding_failure_policy, EmbeddingFailurePolicy::Abort);
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_zero_variants_rejected() {
        let mut config = AppConfig::default();
        config.enhancement.variant_count = 0;
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_knowledge_bases_sorted_by_priority() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "knowledge_bases": [
                {"id": "video", "display_name": "Video", "priority_rank": 4,
                 "default_tag": "VD", "index_url": "http://index/video"},
                {"id": "classical", "display_name": "Classical", "priority_rank": 0,
                 "default_tag": "CL", "index_url": "http://index/classical",
                 "score_threshold": 0.5}
            ]
        }))
        .unwrap();

        let ordered = config.knowledge_bases_by_priority();
        assert_eq!(ordered[0].definition.id.as_str(), "classical");
        assert_eq!(ordered[0].definition.score_threshold, 0.5);
        assert_eq!(ordered[1].definition.score_threshold, DEFAULT_SCORE_THRESHOLD);
    }

    #[test]
    fn test_sample_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");
        let config = AppConfig::from_file(path).unwrap();

        assert_eq!(config.knowledge_bases.len(), 4);
        let rulings = &config.knowledge_bases[2].definition;
        assert!(rulings.is_multi_namespace());
        assert_eq!(rulings.result_cap, 8);
        assert_eq!(rulings.tag_rules[0].field, crate::models::TagField::ContentType);
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");
        let sample = AppConfig::from_file(path).unwrap();
        let defaults = AppConfig::default();

        assert_eq!(sample.enhancement.timeout_secs, 10);
        assert_eq!(sample.enhancement.timeout_secs, defaults.enhancement.timeout_secs);
        assert_eq!(sample.embedding.timeout_secs, defaults.embedding.timeout_secs);
        assert_eq!(sample.retrieval.search_timeout_secs, defaults.retrieval.search_timeout_secs);
        assert_eq!(sample.server.request_timeout_secs, defaults.server.request_timeout_secs);
    }
}
