use std::path::Path;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Turns text into fixed-dimension vectors.
///
/// The same embedder must be used at index time and at query time; the
/// `embedder_id` is persisted with every index generation so a mismatch can
/// be detected on load.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the backend/model (e.g. `ollama:nomic-embed-text`).
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality.
    fn dim(&self) -> usize;
    /// Compute one embedding per input text, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| Error::Embedding("embedder returned no vector".into()))
    }
}

/// Extracts ordered plain-text segments (pages, sections) from a file.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    fn name(&self) -> &str;
    /// Lower-case file extensions this loader accepts, without the dot.
    fn extensions(&self) -> &[&'static str];
    async fn load(&self, path: &Path) -> Result<Vec<String>>;
}
