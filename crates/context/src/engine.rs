//! Context engine
//!
//! Runs one request through the whole pipeline:
//! enhance → fan-out search → filter → assemble → store.

use crate::assembler::CitationAssembler;
use crate::classifier::SourceClassifier;
use crate::enhancer::{HttpEnhancementGateway, QueryEnhancer};
use crate::progress::{PipelineStage, ProgressEvent, ProgressObserver, ProgressReporter};
use citeforge_common::cache::{
    ContextStore, InMemoryContextStore, RedisContextStore, RedisStoreConfig,
};
use citeforge_common::config::{AppConfig, StoreBackend};
use citeforge_common::embeddings::create_embedder;
use citeforge_common::errors::{AppError, Result};
use citeforge_common::metrics;
use citeforge_common::models::{Citation, SourceSelection};
use citeforge_search::{
    HttpVectorIndex, IndexClient, KnowledgeBaseSource, ResultFilter, SearchOrchestrator,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Result of one context assembly
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// Freshly minted id the citations are stored under
    pub message_id: Uuid,

    pub citations: Vec<Citation>,

    pub improved_queries: Vec<String>,

    /// Rendered block for answer generation; empty when nothing was found
    pub context_block: String,

    /// Absorbed failures: failed namespace calls plus skipped variants
    pub warnings: usize,

    /// False when the context store rejected the entry
    pub cached: bool,
}

impl SearchOutcome {
    /// Nothing relevant was found. Not an error.
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}

/// Retrieval-augmented context assembly engine
pub struct ContextEngine {
    enhancer: QueryEnhancer,
    orchestrator: SearchOrchestrator,
    assembler: CitationAssembler,
    store: Arc<dyn ContextStore>,
}

impl ContextEngine {
    /// Wire the engine from its parts. Fails if a tag rule does not compile.
    pub fn new(
        enhancer: QueryEnhancer,
        orchestrator: SearchOrchestrator,
        store: Arc<dyn ContextStore>,
    ) -> Result<Self> {
        let classifier = SourceClassifier::new(orchestrator.knowledge_bases())?;
        Ok(Self {
            enhancer,
            orchestrator,
            assembler: CitationAssembler::new(Arc::new(classifier)),
            store,
        })
    }

    /// Build the engine with HTTP gateways and the configured store
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;

        let sources = config
            .knowledge_bases_by_priority()
            .into_iter()
            .map(|kb| -> Result<KnowledgeBaseSource> {
                let index = HttpVectorIndex::new(
                    kb.definition.id.as_str(),
                    kb.index_url.as_str(),
                    kb.index_api_key.clone(),
                    config.search_timeout(),
                )?;
                let client =
                    IndexClient::new(Arc::new(index)).with_timeout(config.search_timeout());
                Ok(KnowledgeBaseSource::new(kb.definition.clone(), client))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            knowledge_bases = sources.len(),
            top_k = config.retrieval.top_k,
            policy = ?config.retrieval.embedding_failure_policy,
            "Search sources configured"
        );

        let orchestrator = SearchOrchestrator::new(embedder, sources, config.retrieval.top_k)
            .with_failure_policy(config.retrieval.embedding_failure_policy);

        let gateway = HttpEnhancementGateway::new(&config.enhancement)?;
        let enhancer = QueryEnhancer::new(Arc::new(gateway), config.enhancement.variant_count);

        let store: Arc<dyn ContextStore> = match config.store.backend {
            StoreBackend::Memory => {
                warn!("Using in-memory context store; entries are never evicted");
                Arc::new(InMemoryContextStore::new())
            }
            StoreBackend::Redis => {
                let url = config.store.redis_url.clone().ok_or_else(|| AppError::Configuration {
                    message: "store.redis_url is required for the redis backend".to_string(),
                })?;
                Arc::new(
                    RedisContextStore::new(RedisStoreConfig {
                        url,
                        key_prefix: config.store.key_prefix.clone(),
                        ttl_secs: config.store.ttl_secs,
                    })
                    .await?,
                )
            }
        };

        Self::new(enhancer, orchestrator, store)
    }

    pub fn store(&self) -> &Arc<dyn ContextStore> {
        &self.store
    }

    /// Assemble a cited context for a user message
    pub async fn perform_search(
        &self,
        user_message: &str,
        history: &str,
        model_hint: Option<&str>,
        selection: &SourceSelection,
    ) -> Result<SearchOutcome> {
        self.run(user_message, history, model_hint, selection, &ProgressReporter::silent())
            .await
    }

    /// Same as `perform_search`, reporting each stage to `observer`
    pub async fn perform_search_with_progress(
        &self,
        user_message: &str,
        history: &str,
        model_hint: Option<&str>,
        selection: &SourceSelection,
        observer: &dyn ProgressObserver,
    ) -> Result<SearchOutcome> {
        let reporter = ProgressReporter::new(Some(observer));
        self.run(user_message, history, model_hint, selection, &reporter).await
    }

    /// Citations stored for a message, empty when unknown
    pub async fn citations(&self, message_id: Uuid) -> Result<Vec<Citation>> {
        self.store.get(message_id).await
    }

    /// One stored citation, for explaining or re-displaying it
    pub async fn citation(&self, message_id: Uuid, ordinal: usize) -> Result<Citation> {
        self.store
            .citation(message_id, ordinal)
            .await?
            .ok_or_else(|| AppError::CitationNotFound {
                message_id: message_id.to_string(),
                ordinal,
            })
    }

    async fn run(
        &self,
        user_message: &str,
        history: &str,
        model_hint: Option<&str>,
        selection: &SourceSelection,
        reporter: &ProgressReporter<'_>,
    ) -> Result<SearchOutcome> {
        let message_id = Uuid::new_v4();
        let span = tracing::info_span!("perform_search", %message_id);

        async move {
            let start = Instant::now();
            let mut stage = PipelineStage::Idle;
            let mut advance = |next: PipelineStage| {
                debug!(from = ?stage, to = ?next, "Pipeline stage");
                stage = next;
            };

            advance(PipelineStage::EnhancingQuery);
            reporter.emit(ProgressEvent::QueryEnhancementStarted);
            let improved_queries = self
                .enhancer
                .improve_queries(user_message, history, model_hint)
                .await;
            reporter.emit(ProgressEvent::QueriesEnhanced { variants: improved_queries.clone() });

            advance(PipelineStage::Searching);
            let results = self
                .orchestrator
                .search_with_dispatch(&improved_queries, selection, |calls| {
                    reporter.emit(ProgressEvent::SearchDispatched { calls })
                })
                .await?;
            reporter.emit(ProgressEvent::SearchCompleted { counts: results.counts() });

            advance(PipelineStage::Filtering);
            let warnings = results.warning_count();
            let cleaned = ResultFilter::apply(results.by_knowledge_base);

            advance(PipelineStage::Assembling);
            let context = self.assembler.assemble(&cleaned);

            let cached = match self.store.put(message_id, context.citations.clone()).await {
                Ok(()) => {
                    advance(PipelineStage::Cached);
                    true
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Failed to store context, citations will not be retrievable later"
                    );
                    false
                }
            };

            advance(PipelineStage::Done);
            reporter.emit(ProgressEvent::ContextReady { citation_count: context.citations.len() });

            metrics::record_pipeline(start.elapsed().as_secs_f64(), context.citations.len());
            info!(
                citations = context.citations.len(),
                warnings,
                cached,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Context assembled"
            );

            Ok(SearchOutcome {
                message_id,
                citations: context.citations,
                improved_queries,
                context_block: context.rendered_block,
                warnings,
                cached,
            })
        }
        .instrument(span)
        .await
    }
}
