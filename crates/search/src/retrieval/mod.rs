//! Vector index access
//!
//! Provides:
//! - The `VectorIndex` backend trait and its wire types
//! - An HTTP backend
//! - `IndexClient`, which turns raw matches into candidates for one
//!   knowledge base and fans out over its namespaces

mod client;
mod vector;

pub use client::{IndexClient, NamespaceOutcome};
pub use vector::HttpVectorIndex;

use citeforge_common::errors::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Similarity query sent to a vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexQuery {
    pub vector: Vec<f32>,

    pub top_k: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// One raw match as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMatch {
    pub id: String,

    pub score: f32,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Backend response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexResponse {
    #[serde(default)]
    pub matches: Vec<IndexMatch>,
}

/// Common trait for vector index backends
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Run a similarity query, optionally scoped to one namespace
    async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>>;

    /// Backend label for logs
    fn name(&self) -> &str;
}
