//! Source-type classification
//!
//! Each knowledge base registers an ordered list of tag rules once; every
//! citation's tag is decided here and nowhere else.

use citeforge_common::errors::{AppError, Result};
use citeforge_common::models::{Candidate, KnowledgeBase, KnowledgeBaseId, TagField, TagRule};
use regex_lite::{Regex, RegexBuilder};
use std::collections::HashMap;

struct CompiledRule {
    tag: String,
    field: TagField,
    pattern: Regex,
}

impl CompiledRule {
    fn compile(kb: &KnowledgeBase, rule: &TagRule) -> Result<Self> {
        let pattern = RegexBuilder::new(&rule.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!(
                    "invalid tag pattern '{}' for knowledge base '{}': {}",
                    rule.pattern, kb.id, e
                ),
            })?;

        Ok(Self {
            tag: rule.tag.clone(),
            field: rule.field.clone(),
            pattern,
        })
    }

    fn matches(&self, candidate: &Candidate) -> bool {
        let meta = &candidate.metadata;
        let value = match &self.field {
            TagField::Namespace => candidate.namespace.as_deref(),
            TagField::ContentType => meta.content_type.as_deref(),
            TagField::SourceFile => meta.source_file.as_deref(),
            TagField::SourceLink => meta.source_link.as_deref(),
            TagField::Extra(key) => meta.extra_str(key),
        };
        value.is_some_and(|v| self.pattern.is_match(v))
    }
}

struct KnowledgeBaseRules {
    default_tag: String,
    rules: Vec<CompiledRule>,
}

/// Ordered classifier configuration for all registered knowledge bases
pub struct SourceClassifier {
    by_knowledge_base: HashMap<KnowledgeBaseId, KnowledgeBaseRules>,
}

impl SourceClassifier {
    /// Compile the rules of every knowledge base
    pub fn new<'a>(knowledge_bases: impl IntoIterator<Item = &'a KnowledgeBase>) -> Result<Self> {
        let mut by_knowledge_base = HashMap::new();
        for kb in knowledge_bases {
            let rules = kb
                .tag_rules
                .iter()
                .map(|rule| CompiledRule::compile(kb, rule))
                .collect::<Result<Vec<_>>>()?;
            by_knowledge_base.insert(
                kb.id.clone(),
                KnowledgeBaseRules {
                    default_tag: kb.default_tag.clone(),
                    rules,
                },
            );
        }
        Ok(Self { by_knowledge_base })
    }

    /// Tag for a candidate: first matching rule, else the knowledge base's default
    pub fn classify(&self, candidate: &Candidate) -> String {
        match self.by_knowledge_base.get(&candidate.knowledge_base_id) {
            Some(kb) => kb
                .rules
                .iter()
                .find(|rule| rule.matches(candidate))
                .map(|rule| rule.tag.clone())
                .unwrap_or_else(|| kb.default_tag.clone()),
            None => candidate.knowledge_base_id.as_str().to_uppercase(),
        }
    }

    /// Every tag a knowledge base can produce, default first
    pub fn tags_for(&self, id: &KnowledgeBaseId) -> Vec<&str> {
        let Some(kb) = self.by_knowledge_base.get(id) else {
            return Vec::new();
        };
        let mut tags = vec![kb.default_tag.as_str()];
        for rule in &kb.rules {
            if !tags.contains(&rule.tag.as_str()) {
                tags.push(rule.tag.as_str());
            }
        }
        tags
    }
}
