//! Result filtering and deduplication
//!
//! Per knowledge base, in priority order:
//! 1. drop candidates below the knowledge base's score threshold
//! 2. collapse repeated raw ids, keeping the first occurrence
//! 3. drop candidates whose normalized source identifier or normalized text
//!    was already seen, here or in a higher-priority knowledge base
//! 4. cap the list; multi-namespace results are re-ranked by score first,
//!    single-namespace results keep the index's ranking

use crate::orchestrator::KnowledgeBaseResults;
use citeforge_common::models::Candidate;
use std::collections::HashSet;
use tracing::debug;

/// Keys already claimed by kept candidates
#[derive(Debug, Default)]
struct SeenKeys {
    sources: HashSet<String>,
    texts: HashSet<String>,
}

impl SeenKeys {
    fn contains(&self, candidate: &Candidate) -> bool {
        candidate.source_key().is_some_and(|k| self.sources.contains(&k))
            || candidate.text_key().is_some_and(|k| self.texts.contains(&k))
    }

    fn insert(&mut self, candidate: &Candidate) {
        if let Some(key) = candidate.source_key() {
            self.sources.insert(key);
        }
        if let Some(key) = candidate.text_key() {
            self.texts.insert(key);
        }
    }
}

/// Cleans raw fan-out results into citation-ready lists
#[derive(Debug, Default)]
pub struct ResultFilter {
    taken: SeenKeys,
}

impl ResultFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clean every knowledge base's candidates. Input must be in priority
    /// order; earlier knowledge bases win cross-source duplicates.
    pub fn apply(results: Vec<KnowledgeBaseResults>) -> Vec<KnowledgeBaseResults> {
        let mut filter = Self::new();
        results
            .into_iter()
            .map(|r| {
                let candidates = filter.clean(&r);
                KnowledgeBaseResults {
                    knowledge_base: r.knowledge_base,
                    candidates,
                }
            })
            .collect()
    }

    /// Clean one knowledge base's candidates against everything kept so far
    pub fn clean(&mut self, results: &KnowledgeBaseResults) -> Vec<Candidate> {
        let kb = &results.knowledge_base;
        let raw_count = results.candidates.len();

        let mut raw_ids = HashSet::new();
        let mut local = SeenKeys::default();
        let mut kept: Vec<Candidate> = Vec::new();

        for candidate in &results.candidates {
            if candidate.score < kb.score_threshold || candidate.text.trim().is_empty() {
                continue;
            }
            if !raw_ids.insert(candidate.raw_id.as_str()) {
                continue;
            }
            if self.taken.contains(candidate) || local.contains(candidate) {
                continue;
            }
            local.insert(candidate);
            kept.push(candidate.clone());
        }

        if kb.is_multi_namespace() {
            // Stable: equal scores keep discovery order
            kept.sort_by(|a, b| b.score.total_cmp(&a.score));
        }
        kept.truncate(kb.result_cap);

        for candidate in &kept {
            self.taken.insert(candidate);
        }

        debug!(
            knowledge_base = %kb.id,
            raw = raw_count,
            kept = kept.len(),
            threshold = kb.score_threshold,
            "Candidates filtered"
        );

        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citeforge_common::models::{CandidateMetadata, KnowledgeBase};

    fn candidate(kb: &str, id: &str, score: f32, source: Option<&str>, text: &str) -> Candidate {
        Candidate {
            raw_id: id.into(),
            text: text.into(),
            score,
            knowledge_base_id: kb.into(),
            namespace: None,
            metadata: CandidateMetadata {
                source_file: source.map(str::to_string),
                ..Default::default()
            },
        }
    }

    fn results(kb: KnowledgeBase, candidates: Vec<Candidate>) -> KnowledgeBaseResults {
        KnowledgeBaseResults { knowledge_base: kb, candidates }
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.raw_id.as_str()).collect()
    }

    #[test]
    fn test_threshold() {
        let kb = KnowledgeBase::new("a", "A", 0, "A");
        let cleaned = ResultFilter::apply(vec![results(
            kb,
            vec![candidate("a", "1", 0.5, None, "one"), candidate("a", "2", 0.3, None, "two")],
        )]);
        assert_eq!(ids(&cleaned[0].candidates), vec!["1"]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let kb = KnowledgeBase::new("a", "A", 0, "A").with_threshold(0.6);
        let cleaned = ResultFilter::apply(vec![results(
            kb,
            vec![candidate("a", "1", 0.6, None, "one"), candidate("a", "2", 0.59, None, "two")],
        )]);
        assert_eq!(ids(&cleaned[0].candidates), vec!["1"]);
    }

    #[test]
    fn test_raw_id_duplicates_keep_first() {
        let kb = KnowledgeBase::new("a", "A", 0, "A");
        let cleaned = ResultFilter::apply(vec![results(
            kb,
            vec![
                candidate("a", "1", 0.7, None, "first"),
                candidate("a", "1", 0.9, None, "second"),
            ],
        )]);
        assert_eq!(cleaned[0].candidates.len(), 1);
        assert_eq!(cleaned[0].candidates[0].text, "first");
    }

    #[test]
    fn test_source_duplicates_keep_discovery_order() {
        let kb = KnowledgeBase::new("a", "A", 0, "A");
        let cleaned = ResultFilter::apply(vec![results(
            kb,
            vec![
                candidate("a", "1", 0.9, Some("kitab1.pdf"), "first passage"),
                candidate("a", "2", 0.6, Some(" Kitab1.PDF "), "second passage"),
            ],
        )]);
        assert_eq!(ids(&cleaned[0].candidates), vec!["1"]);
    }

    #[test]
    fn test_text_duplicates_dropped() {
        let kb = KnowledgeBase::new("a", "A", 0, "A");
        let cleaned = ResultFilter::apply(vec![results(
            kb,
            vec![
                candidate("a", "1", 0.9, Some("x.pdf"), "Same words"),
                candidate("a", "2", 0.8, Some("y.pdf"), "  same WORDS "),
            ],
        )]);
        assert_eq!(ids(&cleaned[0].candidates), vec!["1"]);
    }

    #[test]
    fn test_cross_source_duplicates_go_to_higher_priority() {
        let first = KnowledgeBase::new("classical", "Classical", 0, "CL");
        let second = KnowledgeBase::new("contemporary", "Contemporary", 3, "CT");
        let cleaned = ResultFilter::apply(vec![
            results(first, vec![candidate("classical", "c1", 0.5, Some("shared.pdf"), "alpha")]),
            results(
                second,
                vec![
                    candidate("contemporary", "m1", 0.95, Some("shared.pdf"), "beta"),
                    candidate("contemporary", "m2", 0.9, None, "ALPHA"),
                    candidate("contemporary", "m3", 0.85, None, "gamma"),
                ],
            ),
        ]);
        assert_eq!(ids(&cleaned[0].candidates), vec!["c1"]);
        assert_eq!(ids(&cleaned[1].candidates), vec!["m3"]);
    }

    #[test]
    fn test_truncated_candidates_do_not_claim_keys() {
        let first = KnowledgeBase::new("a", "A", 0, "A").with_result_cap(1);
        let second = KnowledgeBase::new("b", "B", 1, "B");
        let cleaned = ResultFilter::apply(vec![
            results(
                first,
                vec![
                    candidate("a", "1", 0.9, Some("one.pdf"), "one"),
                    candidate("a", "2", 0.8, Some("two.pdf"), "two"),
                ],
            ),
            results(second, vec![candidate("b", "3", 0.7, Some("two.pdf"), "three")]),
        ]);
        assert_eq!(ids(&cleaned[0].candidates), vec!["1"]);
        assert_eq!(ids(&cleaned[1].candidates), vec!["3"]);
    }

    #[test]
    fn test_cap_ordering_by_namespace_count() {
        let raw = vec![
            candidate("k", "1", 0.5, None, "one"),
            candidate("k", "2", 0.9, None, "two"),
            candidate("k", "3", 0.7, None, "three"),
        ];

        let single = KnowledgeBase::new("k", "K", 0, "K").with_result_cap(2);
        let cleaned = ResultFilter::apply(vec![results(single, raw.clone())]);
        assert_eq!(ids(&cleaned[0].candidates), vec!["1", "2"]);

        let multi = KnowledgeBase::new("k", "K", 0, "K")
            .with_namespaces(["x", "y"])
            .with_result_cap(2);
        let cleaned = ResultFilter::apply(vec![results(multi, raw)]);
        assert_eq!(ids(&cleaned[0].candidates), vec!["2", "3"]);
    }
}
