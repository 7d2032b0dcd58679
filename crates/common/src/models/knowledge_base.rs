//! Knowledge base definitions and source selection

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Default minimum similarity score a candidate needs to survive filtering
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.4;

/// Default number of candidates kept per knowledge base
pub const DEFAULT_RESULT_CAP: usize = 10;

/// Identifier of an independently searchable document collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeBaseId(String);

impl KnowledgeBaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KnowledgeBaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KnowledgeBaseId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Metadata field a tag rule inspects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "key")]
pub enum TagField {
    Namespace,
    ContentType,
    SourceFile,
    SourceLink,
    /// A source-specific key from the open metadata map
    Extra(String),
}

/// One entry of a knowledge base's ordered source-type classifier.
///
/// The first rule whose `pattern` matches the selected field decides the
/// citation's tag. Patterns are case-insensitive regular expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRule {
    pub tag: String,
    pub field: TagField,
    pub pattern: String,
}

/// A searchable knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: KnowledgeBaseId,

    /// Human-readable name used in the rendered header
    pub display_name: String,

    /// Citation order; lower ranks are numbered first
    pub priority_rank: u32,

    /// Index namespaces searched independently. Empty means the index's
    /// single implicit namespace.
    #[serde(default)]
    pub namespaces: Vec<String>,

    #[serde(default = "default_threshold")]
    pub score_threshold: f32,

    #[serde(default = "default_cap")]
    pub result_cap: usize,

    /// Tag used when no classifier rule matches
    pub default_tag: String,

    #[serde(default)]
    pub tag_rules: Vec<TagRule>,
}

fn default_threshold() -> f32 {
    DEFAULT_SCORE_THRESHOLD
}

fn default_cap() -> usize {
    DEFAULT_RESULT_CAP
}

impl KnowledgeBase {
    /// Create a single-namespace knowledge base with default threshold and cap
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        priority_rank: u32,
        default_tag: impl Into<String>,
    ) -> Self {
        Self {
            id: KnowledgeBaseId::new(id),
            display_name: display_name.into(),
            priority_rank,
            namespaces: Vec::new(),
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            result_cap: DEFAULT_RESULT_CAP,
            default_tag: default_tag.into(),
            tag_rules: Vec::new(),
        }
    }

    pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn with_result_cap(mut self, cap: usize) -> Self {
        self.result_cap = cap;
        self
    }

    pub fn with_tag_rule(mut self, rule: TagRule) -> Self {
        self.tag_rules.push(rule);
        self
    }

    /// Namespaces to search; `None` stands for the implicit namespace
    pub fn search_namespaces(&self) -> Vec<Option<&str>> {
        if self.namespaces.is_empty() {
            vec![None]
        } else {
            self.namespaces.iter().map(|ns| Some(ns.as_str())).collect()
        }
    }

    /// True when results are merged from more than one namespace
    pub fn is_multi_namespace(&self) -> bool {
        self.namespaces.len() > 1
    }
}

/// Per-request enable map over knowledge bases.
///
/// Knowledge bases without an entry are enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceSelection(HashMap<KnowledgeBaseId, bool>);

impl SourceSelection {
    /// Everything enabled
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<KnowledgeBaseId>, enabled: bool) -> Self {
        self.0.insert(id.into(), enabled);
        self
    }

    pub fn is_enabled(&self, id: &KnowledgeBaseId) -> bool {
        self.0.get(id).copied().unwrap_or(true)
    }
}

impl From<HashMap<String, bool>> for SourceSelection {
    fn from(map: HashMap<String, bool>) -> Self {
        Self(map.into_iter().map(|(k, v)| (KnowledgeBaseId::new(k), v)).collect())
    }
}
