//! Core data model
//!
//! Types shared by the search fan-out, the filter, the citation assembler
//! and the context store.

mod candidate;
mod citation;
mod knowledge_base;

pub use candidate::{normalize_key, Candidate, CandidateMetadata};
pub use citation::{AssembledContext, Citation, ContextEntry};
pub use knowledge_base::{
    KnowledgeBase, KnowledgeBaseId, SourceSelection, TagField, TagRule,
    DEFAULT_RESULT_CAP, DEFAULT_SCORE_THRESHOLD,
};
