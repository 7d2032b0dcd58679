//! CiteForge Search
//!
//! Retrieval side of context assembly:
//! - Vector index backends and the per-knowledge-base index client
//! - Concurrent fan-out across knowledge bases, query variants and namespaces
//! - Score thresholding and cross-source deduplication

pub mod filter;
pub mod orchestrator;
pub mod retrieval;

pub use filter::ResultFilter;
pub use orchestrator::{
    KnowledgeBaseResults, KnowledgeBaseSource, SearchOrchestrator, SearchResults,
};
pub use retrieval::{HttpVectorIndex, IndexClient, IndexMatch, IndexQuery, VectorIndex};
