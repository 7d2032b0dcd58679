//! Vector index client for one knowledge base
//!
//! Requests twice the wanted result count so the filter has headroom, turns
//! matches into candidates, and degrades failing namespaces to empty results.

use super::{IndexMatch, IndexQuery, VectorIndex};
use citeforge_common::errors::{AppError, Result};
use citeforge_common::metrics;
use citeforge_common::models::{Candidate, CandidateMetadata, KnowledgeBase};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Generic text keys consulted when the canonical full text is missing
const TEXT_KEYS: &[&str] = &["text", "content"];

/// Result of one namespace call after failure recovery
#[derive(Debug, Clone, Default)]
pub struct NamespaceOutcome {
    pub candidates: Vec<Candidate>,
    pub failed: bool,
}

/// Adapter between a knowledge base and its vector index
#[derive(Clone)]
pub struct IndexClient {
    index: Arc<dyn VectorIndex>,
    timeout: Option<Duration>,
}

impl IndexClient {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index, timeout: None }
    }

    /// Deadline applied to every namespace call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Query one namespace. Errors propagate.
    pub async fn search_namespace(
        &self,
        knowledge_base: &KnowledgeBase,
        namespace: Option<&str>,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<Candidate>> {
        let query = IndexQuery {
            vector: vector.to_vec(),
            top_k: top_k * 2,
            namespace: namespace.map(str::to_string),
        };

        let matches = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.index.query(&query))
                .await
                .map_err(|_| AppError::NamespaceSearch {
                    knowledge_base: knowledge_base.id.to_string(),
                    namespace: namespace.unwrap_or("default").to_string(),
                    message: format!("timed out after {}ms", limit.as_millis()),
                })??,
            None => self.index.query(&query).await?,
        };

        let total = matches.len();
        let candidates: Vec<Candidate> = matches
            .into_iter()
            .filter_map(|m| to_candidate(knowledge_base, namespace, m))
            .collect();

        debug!(
            knowledge_base = %knowledge_base.id,
            namespace = namespace.unwrap_or("default"),
            matches = total,
            kept = candidates.len(),
            "Namespace search complete"
        );

        Ok(candidates)
    }

    /// Query one namespace, turning any failure into an empty result
    pub async fn search_namespace_or_empty(
        &self,
        knowledge_base: &KnowledgeBase,
        namespace: Option<&str>,
        vector: &[f32],
        top_k: usize,
    ) -> NamespaceOutcome {
        let result = self.search_namespace(knowledge_base, namespace, vector, top_k).await;
        metrics::record_search_call(knowledge_base.id.as_str(), result.is_ok());

        match result {
            Ok(candidates) => NamespaceOutcome { candidates, failed: false },
            Err(e) => {
                warn!(
                    knowledge_base = %knowledge_base.id,
                    namespace = namespace.unwrap_or("default"),
                    backend = self.index.name(),
                    error = %e,
                    "Namespace search failed, continuing without it"
                );
                NamespaceOutcome { candidates: Vec::new(), failed: true }
            }
        }
    }

    /// Query every namespace of the knowledge base concurrently and merge
    /// the results in namespace order
    pub async fn search(
        &self,
        knowledge_base: &KnowledgeBase,
        vector: &[f32],
        top_k: usize,
    ) -> Vec<Candidate> {
        let calls = knowledge_base
            .search_namespaces()
            .into_iter()
            .map(|ns| self.search_namespace_or_empty(knowledge_base, ns, vector, top_k));

        join_all(calls)
            .await
            .into_iter()
            .flat_map(|outcome| outcome.candidates)
            .collect()
    }
}

/// Build a candidate from a raw match, dropping matches without text
fn to_candidate(
    knowledge_base: &KnowledgeBase,
    namespace: Option<&str>,
    raw: IndexMatch,
) -> Option<Candidate> {
    let mut metadata = CandidateMetadata::from_raw(raw.metadata);

    let generic_text = TEXT_KEYS
        .iter()
        .filter_map(|key| metadata.extra.remove(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        });

    let text = metadata
        .original_text
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or(generic_text)?;

    Some(Candidate {
        raw_id: raw.id,
        text,
        score: raw.score,
        knowledge_base_id: knowledge_base.id.clone(),
        namespace: namespace.map(str::to_string),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Index stub answering per namespace, failing for listed namespaces
    struct StubIndex {
        answers: HashMap<Option<String>, Vec<IndexMatch>>,
        failing: Vec<String>,
        seen_top_k: Mutex<Vec<usize>>,
    }

    #[async_trait::async_trait]
    impl VectorIndex for StubIndex {
        async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>> {
            self.seen_top_k.lock().unwrap().push(query.top_k);
            if let Some(ns) = &query.namespace {
                if self.failing.contains(ns) {
                    return Err(AppError::IndexBackend {
                        knowledge_base: "stub".into(),
                        message: "connection reset".into(),
                    });
                }
            }
            Ok(self.answers.get(&query.namespace).cloned().unwrap_or_default())
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn hit(id: &str, score: f32, metadata: Value) -> IndexMatch {
        IndexMatch {
            id: id.into(),
            score,
            metadata: metadata.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn test_text_extraction_and_headroom() {
        let mut answers = HashMap::new();
        answers.insert(
            None,
            vec![
                hit("1", 0.9, json!({"original_text": "canonical", "text": "generic"})),
                hit("2", 0.8, json!({"text": "generic only"})),
                hit("3", 0.7, json!({"text": "   "})),
                hit("4", 0.6, json!({"source_file": "a.pdf"})),
            ],
        );
        let stub = Arc::new(StubIndex { answers, failing: vec![], seen_top_k: Mutex::new(vec![]) });
        let client = IndexClient::new(stub.clone());
        let kb = KnowledgeBase::new("classical", "Classical", 0, "CL");

        let candidates = client.search(&kb, &[0.1, 0.2], 5).await;

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].text, "canonical");
        assert!(candidates[0].metadata.extra.get("text").is_none());
        assert_eq!(candidates[1].text, "generic only");
        assert_eq!(candidates[1].namespace, None);
        assert_eq!(*stub.seen_top_k.lock().unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_failing_namespace_keeps_siblings() {
        let mut answers = HashMap::new();
        answers.insert(
            Some("site-a".to_string()),
            vec![
                hit("a1", 0.8, json!({"text": "from a"})),
                hit("a2", 0.7, json!({"text": "also a"})),
            ],
        );
        answers.insert(
            Some("site-b".to_string()),
            vec![hit("b1", 0.9, json!({"text": "from b"}))],
        );
        let stub = Arc::new(StubIndex {
            answers,
            failing: vec!["site-b".into()],
            seen_top_k: Mutex::new(vec![]),
        });
        let client = IndexClient::new(stub);
        let kb =
            KnowledgeBase::new("fatwa", "Rulings", 2, "FT").with_namespaces(["site-a", "site-b"]);

        let candidates = client.search(&kb, &[0.3], 5).await;

        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.namespace.as_deref() == Some("site-a")));

        let outcome = client.search_namespace_or_empty(&kb, Some("site-b"), &[0.3], 5).await;
        assert!(outcome.failed);
        assert!(outcome.candidates.is_empty());
    }

    struct SlowIndex;

    #[async_trait::async_trait]
    impl VectorIndex for SlowIndex {
        async fn query(&self, _query: &IndexQuery) -> Result<Vec<IndexMatch>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_namespace_deadline() {
        let client = IndexClient::new(Arc::new(SlowIndex)).with_timeout(Duration::from_millis(20));
        let kb = KnowledgeBase::new("video", "Video", 4, "VD");

        let err = client.search_namespace(&kb, None, &[0.1], 3).await.unwrap_err();
        assert!(matches!(err, AppError::NamespaceSearch { .. }));
    }
}
