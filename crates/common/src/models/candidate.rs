//! Retrieval candidates and their metadata envelope

use super::KnowledgeBaseId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Normalize a source identifier or text for duplicate detection.
///
/// Returns `None` when nothing remains after trimming.
pub fn normalize_key(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Structured view of a match's metadata.
///
/// Well-known fields are lifted out of the backend's untyped map; anything
/// else stays available in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,

    /// Canonical full text of the passage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_link: Option<String>,

    /// Score recorded at indexing time, if the backend stores one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

const SOURCE_FILE_KEYS: &[&str] = &["source_file", "sourceFile", "source"];
const ORIGINAL_TEXT_KEYS: &[&str] = &["original_text", "originalText", "full_text", "fullText"];
const CONTENT_TYPE_KEYS: &[&str] = &["content_type", "contentType", "type"];
const SOURCE_LINK_KEYS: &[&str] = &["source_link", "sourceLink", "url", "link"];
const SCORE_KEYS: &[&str] = &["score"];

impl CandidateMetadata {
    /// Build the envelope from a raw metadata map
    pub fn from_raw(mut raw: Map<String, Value>) -> Self {
        let source_file = take_string(&mut raw, SOURCE_FILE_KEYS);
        let original_text = take_string(&mut raw, ORIGINAL_TEXT_KEYS);
        let content_type = take_string(&mut raw, CONTENT_TYPE_KEYS);
        let source_link = take_string(&mut raw, SOURCE_LINK_KEYS);
        let score = take_first(&mut raw, SCORE_KEYS)
            .and_then(|v| v.as_f64())
            .map(|s| s as f32);

        Self {
            source_file,
            original_text,
            content_type,
            source_link,
            score,
            extra: raw,
        }
    }

    /// String value of a source-specific key
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

fn take_first(raw: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    let mut found = None;
    for key in keys {
        if let Some(value) = raw.remove(*key) {
            if found.is_none() && !value.is_null() {
                found = Some(value);
            }
        }
    }
    found
}

fn take_string(raw: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    take_first(raw, keys).and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// A raw retrieval match prior to filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Backend identifier of the match
    pub raw_id: String,

    /// Passage text as it will be rendered
    pub text: String,

    /// Similarity score reported by the index
    pub score: f32,

    pub knowledge_base_id: KnowledgeBaseId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default)]
    pub metadata: CandidateMetadata,
}

impl Candidate {
    /// Normalized source identifier, falling back to the canonical text
    pub fn source_key(&self) -> Option<String> {
        self.metadata
            .source_file
            .as_deref()
            .and_then(normalize_key)
            .or_else(|| self.metadata.original_text.as_deref().and_then(normalize_key))
    }

    /// Normalized full text of the passage
    pub fn text_key(&self) -> Option<String> {
        normalize_key(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_metadata_lifts_known_fields() {
        let meta = CandidateMetadata::from_raw(raw(json!({
            "sourceFile": "Kitab1.pdf",
            "original_text": "full passage",
            "content_type": "book",
            "url": "https://example.org/1",
            "score": 0.7,
            "volume": 3
        })));

        assert_eq!(meta.source_file.as_deref(), Some("Kitab1.pdf"));
        assert_eq!(meta.original_text.as_deref(), Some("full passage"));
        assert_eq!(meta.content_type.as_deref(), Some("book"));
        assert_eq!(meta.source_link.as_deref(), Some("https://example.org/1"));
        assert!(meta.score.is_some());
        assert_eq!(meta.extra.len(), 1);
        assert_eq!(meta.extra["volume"], json!(3));
    }

    #[test]
    fn test_null_fields_are_absent() {
        let meta =
            CandidateMetadata::from_raw(raw(json!({"source_file": null, "source": "b.pdf"})));
        assert_eq!(meta.source_file.as_deref(), Some("b.pdf"));
        assert!(meta.extra.is_empty());
    }

    #[test]
    fn test_source_key_falls_back_to_original_text() {
        let mut candidate = Candidate {
            raw_id: "1".into(),
            text: "Some Text".into(),
            score: 0.5,
            knowledge_base_id: "classical".into(),
            namespace: None,
            metadata: CandidateMetadata {
                source_file: Some("  ".into()),
                original_text: Some(" Original ".into()),
                ..Default::default()
            },
        };
        assert_eq!(candidate.source_key().as_deref(), Some("original"));

        candidate.metadata.source_file = Some(" KITAB1.pdf ".into());
        assert_eq!(candidate.source_key().as_deref(), Some("kitab1.pdf"));
        assert_eq!(candidate.text_key().as_deref(), Some("some text"));
    }
}
