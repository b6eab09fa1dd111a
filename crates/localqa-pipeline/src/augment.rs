//! Retrieval augmentation of the prompt.

use std::sync::Arc;

use localqa_core::types::SearchHit;
use localqa_vector::VectorStore;
use tracing::{debug, warn};

pub const CONTEXT_PREAMBLE: &str = "Use the following context to answer accurately:";

/// Context prompt from ranked hits.
pub fn build_prompt(query: &str, hits: &[SearchHit]) -> String {
    let context = hits.iter().map(|h| h.chunk.content.as_str()).collect::<Vec<_>>().join("\n\n");
    format!("{CONTEXT_PREAMBLE}\n\n{context}\n\nQuestion: {query}")
}

#[derive(Debug, Clone)]
pub struct Augmentation {
    pub prompt: String,
    /// Empty when the raw query was used.
    pub hits: Vec<SearchHit>,
}

impl Augmentation {
    fn raw(query: &str) -> Self {
        Self { prompt: query.to_string(), hits: Vec::new() }
    }

    pub fn is_augmented(&self) -> bool {
        !self.hits.is_empty()
    }
}

pub struct Augmenter {
    store: Arc<VectorStore>,
    top_k: usize,
}

impl Augmenter {
    pub fn new(store: Arc<VectorStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }

    /// Never fails: any retrieval problem yields the raw query.
    pub async fn augment(&self, query: &str, enabled: bool) -> Augmentation {
        if !enabled {
            return Augmentation::raw(query);
        }
        if self.store.is_empty() {
            debug!("index empty; answering without context");
            return Augmentation::raw(query);
        }
        match self.store.search(query, self.top_k).await {
            Ok(hits) if !hits.is_empty() => {
                debug!(hits = hits.len(), generation = hits[0].generation, "prompt augmented");
                Augmentation { prompt: build_prompt(query, &hits), hits }
            }
            Ok(_) => Augmentation::raw(query),
            Err(e) => {
                warn!(error = %e, "retrieval failed; answering without context");
                Augmentation::raw(query)
            }
        }
    }
}
