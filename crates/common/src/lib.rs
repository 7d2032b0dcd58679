//! CiteForge Common Library
//!
//! Shared code for the CiteForge crates including:
//! - Knowledge base, candidate and citation models
//! - Embedding gateway abstraction
//! - Error types and handling
//! - Configuration management
//! - Context store (in-memory and Redis)
//! - Metrics and observability

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod models;

// Re-export commonly used types
pub use cache::{ContextStore, InMemoryContextStore};
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
