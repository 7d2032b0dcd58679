//! Context assembly handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use citeforge_common::{
    errors::{AppError, Result},
    models::{Citation, SourceSelection},
};

/// Context search request
#[derive(Debug, Deserialize, Validate)]
pub struct ContextSearchRequest {
    #[validate(length(min = 1, max = 4000))]
    pub message: String,

    /// Rendered conversation so far
    #[serde(default)]
    #[validate(length(max = 32000))]
    pub history: String,

    #[serde(default)]
    pub model_hint: Option<String>,

    /// Knowledge base enable-map; missing entries are enabled
    #[serde(default)]
    pub sources: HashMap<String, bool>,
}

/// Context search response
#[derive(Serialize)]
pub struct ContextSearchResponse {
    pub message_id: Uuid,
    pub improved_queries: Vec<String>,
    pub citation_count: usize,
    pub citations: Vec<Citation>,
    pub context_block: String,
    pub warnings: usize,
    pub processing_time_ms: u64,
}

/// Assemble a cited context for a message
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<ContextSearchRequest>,
) -> Result<Json<ContextSearchResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    if request.message.trim().is_empty() {
        return Err(AppError::Validation {
            message: "message must not be blank".to_string(),
            field: Some("message".to_string()),
        });
    }

    let selection = SourceSelection::from(request.sources);
    let outcome = state
        .engine
        .perform_search(
            &request.message,
            &request.history,
            request.model_hint.as_deref(),
            &selection,
        )
        .await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        message_id = %outcome.message_id,
        citations = outcome.citations.len(),
        warnings = outcome.warnings,
        latency_ms = processing_time_ms,
        "Context search completed"
    );

    Ok(Json(ContextSearchResponse {
        message_id: outcome.message_id,
        improved_queries: outcome.improved_queries,
        citation_count: outcome.citations.len(),
        citations: outcome.citations,
        context_block: outcome.context_block,
        warnings: outcome.warnings,
        processing_time_ms,
    }))
}

/// Cached citations for a message; unknown or malformed ids yield `[]`
pub async fn get_context(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<Json<Vec<Citation>>> {
    let Ok(message_id) = Uuid::parse_str(&message_id) else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(state.engine.citations(message_id).await?))
}

/// One cached citation by ordinal
pub async fn get_citation(
    State(state): State<AppState>,
    Path((message_id, ordinal)): Path<(String, usize)>,
) -> Result<Json<Citation>> {
    let id = Uuid::parse_str(&message_id).map_err(|_| AppError::CitationNotFound {
        message_id: message_id.clone(),
        ordinal,
    })?;
    Ok(Json(state.engine.citation(id, ordinal).await?))
}
