//! Context store
//!
//! Keeps the citation list of every assembled context under its freshly
//! minted message id so individual citations can be explained or shown
//! again later. Entries are write-once and never mutated.
//!
//! Provides:
//! - An injectable `ContextStore` capability
//! - An unbounded in-process implementation
//! - A Redis implementation with optional TTL eviction

use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{Citation, ContextEntry};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Storage capability for assembled citation lists
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Store the citations of one assembled context.
    ///
    /// Fails with `AppError::Duplicate` if the id was already written.
    async fn put(&self, message_id: Uuid, citations: Vec<Citation>) -> Result<()>;

    /// Citations for a message, empty when unknown
    async fn get(&self, message_id: Uuid) -> Result<Vec<Citation>>;

    /// Whether an entry exists for the message
    async fn has(&self, message_id: Uuid) -> Result<bool>;

    /// Backend label for logs and metrics
    fn backend(&self) -> &'static str;

    /// A single citation by its ordinal
    async fn citation(&self, message_id: Uuid, ordinal: usize) -> Result<Option<Citation>> {
        Ok(self
            .get(message_id)
            .await?
            .into_iter()
            .find(|c| c.ordinal == ordinal))
    }
}

/// Process-wide in-memory store.
///
/// Grows without bound: every request adds one entry and nothing is ever
/// removed. Use the Redis backend with a TTL where that matters.
#[derive(Default)]
pub struct InMemoryContextStore {
    entries: RwLock<HashMap<Uuid, ContextEntry>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored contexts
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn put(&self, message_id: Uuid, citations: Vec<Citation>) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&message_id) {
            return Err(AppError::Duplicate {
                message: format!("context {} already stored", message_id),
            });
        }
        debug!(%message_id, citations = citations.len(), "Context stored");
        entries.insert(message_id, ContextEntry::new(message_id, citations));
        Ok(())
    }

    async fn get(&self, message_id: Uuid) -> Result<Vec<Citation>> {
        let entries = self.entries.read().await;
        let citations = entries.get(&message_id).map(|e| e.citations.clone());
        metrics::record_store_lookup(citations.is_some(), self.backend());
        Ok(citations.unwrap_or_default())
    }

    async fn has(&self, message_id: Uuid) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(&message_id))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Redis store configuration
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: String,
    /// Entry TTL in seconds; 0 disables expiry
    pub ttl_secs: u64,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "citeforge:context".to_string(),
            ttl_secs: 0,
        }
    }
}

/// Redis-backed store
pub struct RedisContextStore {
    connection: MultiplexedConnection,
    config: RedisStoreConfig,
}

impl RedisContextStore {
    /// Connect to Redis
    pub async fn new(config: RedisStoreConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to create Redis client: {}", e)
            })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self { connection, config })
    }

    /// Build a prefixed key
    fn key(&self, message_id: Uuid) -> String {
        format!("{}:{}", self.config.key_prefix, keys::context(message_id))
    }

    async fn entry(&self, message_id: Uuid) -> Result<Option<ContextEntry>> {
        let full_key = self.key(message_id);
        let mut conn = self.connection.clone();

        let value: Option<String> = conn.get(&full_key).await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to get key '{}': {}", full_key, e),
            })?;

        value
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| AppError::CacheError {
                    message: format!("Failed to parse cached value: {}", e),
                })
            })
            .transpose()
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }
}

#[async_trait]
impl ContextStore for RedisContextStore {
    async fn put(&self, message_id: Uuid, citations: Vec<Citation>) -> Result<()> {
        let full_key = self.key(message_id);
        let json = serde_json::to_string(&ContextEntry::new(message_id, citations))
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to serialize value: {}", e),
            })?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(&full_key).arg(&json).arg("NX");
        if self.config.ttl_secs > 0 {
            cmd.arg("EX").arg(self.config.ttl_secs);
        }

        let mut conn = self.connection.clone();
        let stored: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to set key '{}': {}", full_key, e),
            })?;

        if stored.is_none() {
            return Err(AppError::Duplicate {
                message: format!("context {} already stored", message_id),
            });
        }

        debug!(key = %full_key, ttl_secs = self.config.ttl_secs, "Context stored");
        Ok(())
    }

    async fn get(&self, message_id: Uuid) -> Result<Vec<Citation>> {
        let entry = self.entry(message_id).await?;
        metrics::record_store_lookup(entry.is_some(), self.backend());
        Ok(entry.map(|e| e.citations).unwrap_or_default())
    }

    async fn has(&self, message_id: Uuid) -> Result<bool> {
        let full_key = self.key(message_id);
        let mut conn = self.connection.clone();

        let exists: bool = conn.exists(&full_key).await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to check key '{}': {}", full_key, e),
            })?;

        Ok(exists)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// Cache key builder helpers
pub mod keys {
    use uuid::Uuid;

    /// Build a context entry key
    pub fn context(message_id: Uuid) -> String {
        format!("ctx:{}", message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candidate, CandidateMetadata};

    fn citation(ordinal: usize, raw_id: &str) -> Citation {
        Citation {
            ordinal,
            tag: "CL".into(),
            knowledge_base_id: "classical".into(),
            candidate: Candidate {
                raw_id: raw_id.into(),
                text: format!("passage {}", raw_id),
                score: 0.8,
                knowledge_base_id: "classical".into(),
                namespace: None,
                metadata: CandidateMetadata::default(),
            },
        }
    }

    #[test]
    fn test_key_builders() {
        let id = Uuid::new_v4();
        assert!(keys::context(id).starts_with("ctx:"));
    }

    #[test]
    fn test_unknown_id_is_empty() {
        let store = InMemoryContextStore::new();
        let id = Uuid::new_v4();
        tokio_test::block_on(async {
            assert!(store.get(id).await.unwrap().is_empty());
            assert!(!store.has(id).await.unwrap());
            assert!(store.citation(id, 1).await.unwrap().is_none());
        });
    }

    #[tokio::test]
    async fn test_get_is_stable() {
        let store = InMemoryContextStore::new();
        let id = Uuid::new_v4();
        store.put(id, vec![citation(1, "a"), citation(2, "b")]).await.unwrap();

        let first = store.get(id).await.unwrap();
        let second = store.get(id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(store.has(id).await.unwrap());
        assert_eq!(store.citation(id, 2).await.unwrap().unwrap().candidate.raw_id, "b");
    }

    #[tokio::test]
    async fn test_entries_are_write_once() {
        let store = InMemoryContextStore::new();
        let id = Uuid::new_v4();
        store.put(id, vec![citation(1, "a")]).await.unwrap();

        let err = store.put(id, vec![citation(1, "z")]).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate { .. }));
        assert_eq!(store.get(id).await.unwrap()[0].candidate.raw_id, "a");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_context_is_stored() {
        let store = InMemoryContextStore::new();
        let id = Uuid::new_v4();
        store.put(id, Vec::new()).await.unwrap();
        assert!(store.has(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_empty());
    }
}
