//! Domain types shared by the router, the vector index and the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type ChunkId = String;

/// Sentinel model name asking the router to pick a model.
pub const AUTO_MODEL: &str = "auto";

/// A chunk of a retained source document that is independently embedded.
///
/// - `id`: `<doc_id>:<chunk_index>`, unique within one index generation
/// - `doc_id`: the retained file name the chunk came from
/// - `doc_path`: path of the source file when it was ingested
/// - `content_hash`: BLAKE3 of `content`, hex encoded
/// - `chunk_index`/`total_chunks`: position within the parent document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub doc_path: String,
    pub content: String,
    pub content_hash: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// One ranked search result.
///
/// `distance` is the squared L2 distance to the query vector; lower is
/// closer. `generation` identifies the index generation the hit was read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: DocumentChunk,
    pub distance: f32,
    pub generation: u64,
}

/// A single request against the pipeline. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub model: String,
    pub use_retrieval: bool,
}

impl Query {
    pub fn new(text: impl Into<String>, model: impl Into<String>, use_retrieval: bool) -> Self {
        Self { text: text.into(), model: model.into(), use_retrieval }
    }

    pub fn auto(text: impl Into<String>) -> Self {
        Self::new(text, AUTO_MODEL, false)
    }

    pub fn with_retrieval(mut self, enabled: bool) -> Self {
        self.use_retrieval = enabled;
        self
    }

    pub fn is_auto(&self) -> bool {
        self.model.trim().eq_ignore_ascii_case(AUTO_MODEL)
    }
}

/// Coarse topical category used to pick a specialised model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainLabel {
    Legal,
    Science,
    Insurance,
    Math,
    Code,
    General,
}

impl DomainLabel {
    /// Labels the classifier may answer with, in precedence order for
    /// substring matching. `General` is the fallback and is not listed.
    pub const CLASSIFIABLE: [DomainLabel; 5] = [
        DomainLabel::Legal,
        DomainLabel::Science,
        DomainLabel::Insurance,
        DomainLabel::Math,
        DomainLabel::Code,
    ];

    pub const ALL: [DomainLabel; 6] = [
        DomainLabel::Legal,
        DomainLabel::Science,
        DomainLabel::Insurance,
        DomainLabel::Math,
        DomainLabel::Code,
        DomainLabel::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DomainLabel::Legal => "legal",
            DomainLabel::Science => "science",
            DomainLabel::Insurance => "insurance",
            DomainLabel::Math => "math",
            DomainLabel::Code => "code",
            DomainLabel::General => "general",
        }
    }
}

impl fmt::Display for DomainLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        DomainLabel::ALL
            .into_iter()
            .find(|d| d.as_str() == needle)
            .ok_or_else(|| format!("unknown domain '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_parses_case_insensitively() {
        assert_eq!("  LEGAL ".parse::<DomainLabel>(), Ok(DomainLabel::Legal));
        assert_eq!("general".parse::<DomainLabel>(), Ok(DomainLabel::General));
        assert!("physics".parse::<DomainLabel>().is_err());
    }

    #[test]
    fn auto_sentinel_is_detected() {
        assert!(Query::auto("hi").is_auto());
        assert!(Query::new("hi", "AUTO", false).is_auto());
        assert!(!Query::new("hi", "llama3", false).is_auto());
    }
}
