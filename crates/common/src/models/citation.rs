//! Citations and assembled contexts

use super::{Candidate, KnowledgeBaseId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A candidate that survived filtering and received a rendering ordinal.
///
/// Ordinals are only meaningful inside one assembled context; anything that
/// outlives the response must reference `candidate.raw_id` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based, contiguous within one context
    pub ordinal: usize,

    /// Source-type abbreviation
    pub tag: String,

    pub knowledge_base_id: KnowledgeBaseId,

    pub candidate: Candidate,
}

impl Citation {
    /// Marker used in the rendered block, e.g. `[CIT3]`
    pub fn marker(&self) -> String {
        format!("[CIT{}]", self.ordinal)
    }
}

/// Final output of citation assembly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub citations: Vec<Citation>,
    pub rendered_block: String,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}

/// Stored form of one request's citations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub message_id: Uuid,
    pub citations: Vec<Citation>,
    pub created_at: DateTime<Utc>,
}

impl ContextEntry {
    pub fn new(message_id: Uuid, citations: Vec<Citation>) -> Self {
        Self {
            message_id,
            citations,
            created_at: Utc::now(),
        }
    }
}
