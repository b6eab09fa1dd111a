//! Embedding engine clients.
//!
//! - [`OllamaEmbedder`]: the Ollama `/api/embed` endpoint (default backend)
//! - [`FakeEmbedder`]: deterministic hashed bag-of-words vectors for tests
//! - `BgeM3Embedder`: in-process BGE-M3 via candle (`local-bge` feature)
//!
//! [`get_default_embedder`] picks one from configuration. Setting
//! `APP_USE_FAKE_EMBEDDINGS=1` forces the fake embedder regardless of config.

use std::sync::Arc;

use async_trait::async_trait;
use localqa_core::config::{EmbeddingBackend, EmbeddingSettings};
use localqa_core::traits::Embedder;
use localqa_core::{Error, Result};
use tracing::info;

#[cfg(feature = "local-bge")]
mod bge;
#[cfg(feature = "local-bge")]
mod device;
mod ollama;
#[cfg(feature = "local-bge")]
mod pool;
#[cfg(feature = "local-bge")]
mod tokenize;

#[cfg(feature = "local-bge")]
pub use bge::BgeM3Embedder;
pub use ollama::OllamaEmbedder;
#[cfg(feature = "local-bge")]
pub use pool::masked_mean_l2;

/// Hashes whitespace tokens into a fixed number of buckets and L2-normalizes.
/// Texts sharing words land close together, which is enough for retrieval
/// tests without a model.
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("fake:d{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;

        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if token.is_empty() {
                continue;
            }
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += 0.5 + val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Run CPU-bound model work on the blocking pool so a forward pass does not
/// stall the async workers.
#[cfg_attr(not(feature = "local-bge"), allow(dead_code))]
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Embedding(format!("embedding task failed: {e}")))?
}

fn fake_forced_by_env() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the configured embedder. `base_url` is the Ollama endpoint used by
/// the `ollama` backend.
pub fn get_default_embedder(settings: &EmbeddingSettings, base_url: &str) -> Result<Arc<dyn Embedder>> {
    if fake_forced_by_env() {
        info!(dim = settings.dimension, "APP_USE_FAKE_EMBEDDINGS set, using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(settings.dimension)));
    }
    match settings.backend {
        EmbeddingBackend::Fake => {
            info!(dim = settings.dimension, "using FakeEmbedder");
            Ok(Arc::new(FakeEmbedder::new(settings.dimension)))
        }
        EmbeddingBackend::Ollama => {
            info!(model = %settings.model, base_url, "using Ollama embeddings");
            Ok(Arc::new(OllamaEmbedder::new(base_url, &settings.model, settings.dimension)))
        }
        EmbeddingBackend::Local => local_embedder(settings),
    }
}

#[cfg(feature = "local-bge")]
fn local_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(BgeM3Embedder::new(&settings.model_dir)?))
}

#[cfg(not(feature = "local-bge"))]
fn local_embedder(_settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    Err(Error::InvalidConfig(
        "embedding.backend = \"local\" requires building localqa-embed with the `local-bge` feature".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn shared_words_are_closer_than_unrelated_text() {
        let e = FakeEmbedder::new(256);
        let q = e.embed_text("tort law negligence");
        let near = e.embed_text("Negligence is a tort in civil law.");
        let far = e.embed_text("photosynthesis converts light into sugar");
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocking_work_leaves_the_runtime_free() {
        // The closure blocks until the async side sends, which can only
        // happen if it is not running on the single runtime thread.
        let (tx, rx) = std::sync::mpsc::channel::<u32>();
        let work = run_blocking(move || {
            rx.recv_timeout(std::time::Duration::from_secs(5))
                .map_err(|e| Error::Embedding(e.to_string()))
        });
        let sender = async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            tx.send(7).expect("receiver alive");
        };
        let (got, ()) = tokio::time::timeout(std::time::Duration::from_secs(10), async { tokio::join!(work, sender) })
            .await
            .expect("runtime stayed responsive");
        assert_eq!(got.expect("blocking work"), 7);
    }

    #[tokio::test]
    async fn blocking_errors_are_propagated() {
        let err = run_blocking(|| Err::<(), _>(Error::Embedding("device lost".into())))
            .await
            .expect_err("error returned");
        assert!(err.to_string().contains("device lost"));
    }

    #[test]
    fn empty_text_does_not_produce_nan() {
        let v = FakeEmbedder::new(8).embed_text("   ");
        assert!(v.iter().all(|x| x.is_finite()));
    }
}
