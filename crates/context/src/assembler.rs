//! Citation assembly
//!
//! Numbers cleaned candidates with one running counter across knowledge
//! bases in priority order and renders the context block handed to answer
//! generation.

use crate::classifier::SourceClassifier;
use citeforge_common::models::{AssembledContext, Citation};
use citeforge_search::KnowledgeBaseResults;
use std::fmt::Write;
use std::sync::Arc;

const BLOCK_HEADER: &str = "=== RETRIEVED SOURCES ===";
const INDEX_HEADER: &str = "=== CITATION INDEX ===";

/// Turns filtered results into numbered citations and a rendered block
#[derive(Clone)]
pub struct CitationAssembler {
    classifier: Arc<SourceClassifier>,
}

impl CitationAssembler {
    pub fn new(classifier: Arc<SourceClassifier>) -> Self {
        Self { classifier }
    }

    /// Assign ordinals and render. An empty input yields an empty context
    /// with an empty block.
    pub fn assemble(&self, cleaned: &[KnowledgeBaseResults]) -> AssembledContext {
        let mut ordered: Vec<&KnowledgeBaseResults> = cleaned.iter().collect();
        ordered.sort_by_key(|r| r.knowledge_base.priority_rank);

        let citations: Vec<Citation> = ordered
            .iter()
            .flat_map(|r| r.candidates.iter())
            .enumerate()
            .map(|(i, candidate)| Citation {
                ordinal: i + 1,
                tag: self.classifier.classify(candidate),
                knowledge_base_id: candidate.knowledge_base_id.clone(),
                candidate: candidate.clone(),
            })
            .collect();

        if citations.is_empty() {
            return AssembledContext::default();
        }

        let rendered_block = self.render(&ordered, &citations);
        AssembledContext { citations, rendered_block }
    }

    fn render(&self, ordered: &[&KnowledgeBaseResults], citations: &[Citation]) -> String {
        let mut block = String::new();

        // Writing into a String cannot fail
        let _ = writeln!(block, "{}", BLOCK_HEADER);
        let _ = writeln!(
            block,
            "Cite passages inline with their marker [CITn]. Use only the numbers listed below."
        );

        let legend: Vec<String> = ordered
            .iter()
            .flat_map(|r| {
                self.classifier
                    .tags_for(&r.knowledge_base.id)
                    .into_iter()
                    .map(|tag| format!("[{}] {}", tag, r.knowledge_base.display_name))
                    .collect::<Vec<_>>()
            })
            .collect();
        let _ = writeln!(block, "Source types: {}", legend.join("; "));

        let priority: Vec<&str> = ordered
            .iter()
            .map(|r| r.knowledge_base.display_name.as_str())
            .collect();
        let _ = writeln!(block, "Priority order: {}", priority.join(" > "));
        block.push('\n');

        for citation in citations {
            let _ = writeln!(
                block,
                "{}[{}] {}",
                citation.marker(),
                citation.tag,
                citation.candidate.text
            );
        }

        block.push('\n');
        let _ = writeln!(block, "{}", INDEX_HEADER);
        for citation in citations {
            let _ = writeln!(
                block,
                "CIT{} -> {}:{}",
                citation.ordinal, citation.knowledge_base_id, citation.candidate.raw_id
            );
        }

        block
    }
}
