use async_trait::async_trait;
use localqa_core::traits::Embedder;
use localqa_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Embeddings from a running Ollama server (`POST /api/embed`).
pub struct OllamaEmbedder {
    http: reqwest::Client,
    base_url: String,
    model: String,
    dim: usize,
    id: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, dim: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dim,
            id: format!("ollama:{model}:d{dim}"),
        }
    }

    fn embed_url(&self) -> String {
        format!("{}/api/embed", self.base_url)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, batch = texts.len(), "requesting embeddings");
        let response = self
            .http
            .post(self.embed_url())
            .json(&EmbedRequest { model: &self.model, input: texts })
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("request to {} failed: {e}", self.embed_url())))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!("HTTP {status}: {body}")));
        }
        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("invalid embed response: {e}")))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        if let Some(bad) = parsed.embeddings.iter().find(|v| v.len() != self.dim) {
            return Err(Error::Embedding(format!(
                "model {} returned dimension {}, configured {}",
                self.model,
                bad.len(),
                self.dim
            )));
        }
        Ok(parsed.embeddings)
    }
}
