//! Parallel search orchestration
//!
//! Embeds every query variant, then dispatches one search call per enabled
//! knowledge base × variant × namespace and joins the whole batch before
//! anything downstream runs.

use crate::retrieval::{IndexClient, NamespaceOutcome};
use citeforge_common::config::EmbeddingFailurePolicy;
use citeforge_common::embeddings::Embedder;
use citeforge_common::errors::{AppError, Result};
use citeforge_common::metrics;
use citeforge_common::models::{Candidate, KnowledgeBase, KnowledgeBaseId, SourceSelection};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// A knowledge base and the client for its index
#[derive(Clone)]
pub struct KnowledgeBaseSource {
    pub knowledge_base: KnowledgeBase,
    pub client: IndexClient,
}

impl KnowledgeBaseSource {
    pub fn new(knowledge_base: KnowledgeBase, client: IndexClient) -> Self {
        Self { knowledge_base, client }
    }
}

/// Raw candidates of one knowledge base, in discovery order
#[derive(Debug, Clone)]
pub struct KnowledgeBaseResults {
    pub knowledge_base: KnowledgeBase,
    pub candidates: Vec<Candidate>,
}

/// Output of one fan-out
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    /// Enabled knowledge bases in priority order
    pub by_knowledge_base: Vec<KnowledgeBaseResults>,

    /// Search calls dispatched in the batch
    pub calls_dispatched: usize,

    /// Namespace calls that failed and contributed nothing
    pub failed_calls: usize,

    /// Variants dropped because they could not be embedded
    pub skipped_variants: usize,
}

impl SearchResults {
    /// Raw candidate count per knowledge base
    pub fn counts(&self) -> BTreeMap<KnowledgeBaseId, usize> {
        self.by_knowledge_base
            .iter()
            .map(|r| (r.knowledge_base.id.clone(), r.candidates.len()))
            .collect()
    }

    pub fn total_candidates(&self) -> usize {
        self.by_knowledge_base.iter().map(|r| r.candidates.len()).sum()
    }

    /// Failures that were absorbed rather than surfaced
    pub fn warning_count(&self) -> usize {
        self.failed_calls + self.skipped_variants
    }
}

/// Fans search calls out across knowledge bases, variants and namespaces
pub struct SearchOrchestrator {
    embedder: Arc<dyn Embedder>,
    sources: Vec<KnowledgeBaseSource>,
    top_k: usize,
    failure_policy: EmbeddingFailurePolicy,
}

impl SearchOrchestrator {
    /// Create an orchestrator; sources are kept in priority order
    pub fn new(
        embedder: Arc<dyn Embedder>,
        mut sources: Vec<KnowledgeBaseSource>,
        top_k: usize,
    ) -> Self {
        sources.sort_by_key(|s| s.knowledge_base.priority_rank);
        Self {
            embedder,
            sources,
            top_k,
            failure_policy: EmbeddingFailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: EmbeddingFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Registered knowledge bases in priority order
    pub fn knowledge_bases(&self) -> impl Iterator<Item = &KnowledgeBase> {
        self.sources.iter().map(|s| &s.knowledge_base)
    }

    fn enabled<'a>(
        &'a self,
        selection: &'a SourceSelection,
    ) -> impl Iterator<Item = &'a KnowledgeBaseSource> + 'a {
        self.sources
            .iter()
            .filter(move |s| selection.is_enabled(&s.knowledge_base.id))
    }

    /// Run the full fan-out for a set of query variants
    pub async fn search(
        &self,
        variants: &[String],
        selection: &SourceSelection,
    ) -> Result<SearchResults> {
        self.search_with_dispatch(variants, selection, |_| {}).await
    }

    /// Run the fan-out, handing `on_dispatch` the number of calls actually
    /// sent once embedding has settled. Not called when embedding aborts.
    pub async fn search_with_dispatch<F>(
        &self,
        variants: &[String],
        selection: &SourceSelection,
        on_dispatch: F,
    ) -> Result<SearchResults>
    where
        F: FnOnce(usize) + Send,
    {
        let start = Instant::now();
        let enabled: Vec<&KnowledgeBaseSource> = self.enabled(selection).collect();

        if enabled.is_empty() || variants.is_empty() {
            info!(variants = variants.len(), "No knowledge base enabled, skipping search");
            on_dispatch(0);
            return Ok(SearchResults {
                by_knowledge_base: enabled
                    .iter()
                    .map(|s| KnowledgeBaseResults {
                        knowledge_base: s.knowledge_base.clone(),
                        candidates: Vec::new(),
                    })
                    .collect(),
                ..Default::default()
            });
        }

        let (vectors, skipped_variants) = self.embed_variants(variants).await?;

        // One future per (knowledge base, variant, namespace)
        let mut calls = Vec::new();
        for (kb_index, source) in enabled.iter().enumerate() {
            for vector in &vectors {
                for namespace in source.knowledge_base.search_namespaces() {
                    let source = *source;
                    calls.push(async move {
                        let kb = &source.knowledge_base;
                        let outcome = source
                            .client
                            .search_namespace_or_empty(kb, namespace, vector, self.top_k)
                            .await;
                        (kb_index, outcome)
                    });
                }
            }
        }

        let calls_dispatched = calls.len();
        on_dispatch(calls_dispatched);
        let outcomes: Vec<(usize, NamespaceOutcome)> = join_all(calls).await;

        let mut grouped: Vec<Vec<Candidate>> = vec![Vec::new(); enabled.len()];
        let mut failed_calls = 0;
        for (kb_index, outcome) in outcomes {
            if outcome.failed {
                failed_calls += 1;
            }
            grouped[kb_index].extend(outcome.candidates);
        }

        let by_knowledge_base: Vec<KnowledgeBaseResults> = enabled
            .iter()
            .zip(grouped)
            .map(|(source, candidates)| {
                metrics::record_candidates(source.knowledge_base.id.as_str(), candidates.len());
                KnowledgeBaseResults {
                    knowledge_base: source.knowledge_base.clone(),
                    candidates,
                }
            })
            .collect();

        let results = SearchResults {
            by_knowledge_base,
            calls_dispatched,
            failed_calls,
            skipped_variants,
        };

        info!(
            knowledge_bases = enabled.len(),
            variants = vectors.len(),
            calls = calls_dispatched,
            failed_calls,
            candidates = results.total_candidates(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search fan-out complete"
        );

        Ok(results)
    }

    /// Embed all variants concurrently, applying the failure policy
    async fn embed_variants(&self, variants: &[String]) -> Result<(Vec<Vec<f32>>, usize)> {
        let embeddings = join_all(variants.iter().map(|v| self.embedder.embed(v))).await;

        let mut vectors = Vec::with_capacity(embeddings.len());
        let mut last_error: Option<AppError> = None;
        let mut skipped = 0;

        for (index, embedding) in embeddings.into_iter().enumerate() {
            match embedding {
                Ok(vector) => vectors.push(vector),
                Err(e) => match self.failure_policy {
                    EmbeddingFailurePolicy::Abort => {
                        warn!(variant = index, error = %e, "Embedding failed, aborting request");
                        return Err(e);
                    }
                    EmbeddingFailurePolicy::SkipVariant => {
                        warn!(variant = index, error = %e, "Embedding failed, skipping variant");
                        skipped += 1;
                        last_error = Some(e);
                    }
                },
            }
        }

        match (vectors.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok((vectors, skipped)),
        }
    }
}
