//! Ollama REST backend (`/api/generate`, `/api/tags`, `/api/pull`).

use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::{FragmentStream, GenerationEngine, ProgressStream, PullProgress};
use crate::error::{EngineError, Result};
use crate::ndjson::decode_stream;

pub struct OllamaHttpEngine {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct PullLine {
    #[serde(flatten)]
    progress: PullProgress,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaHttpEngine {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self { http, base_url: base_url.trim_end_matches('/').to_string() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B, model: &str) -> Result<reqwest::Response> {
        let url = self.url(path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::RequestFailed(format!("{url}: {e}")))?;
        check_status(response, model).await
    }
}

/// Map a non-2xx reply to an error, keeping Ollama's `{"error": ...}` text.
async fn check_status(response: reqwest::Response, model: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(EngineError::ModelNotFound(format!("{model}: {message}")));
    }
    Err(EngineError::RequestFailed(format!("HTTP {status}: {message}")))
}

#[async_trait]
impl GenerationEngine for OllamaHttpEngine {
    fn name(&self) -> &str {
        "ollama-http"
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let response = self
            .post("/api/generate", &GenerateRequest { model, prompt, stream: false }, model)
            .await?;
        let chunk: GenerateChunk = response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse(format!("generate reply: {e}")))?;
        match chunk.error {
            Some(err) => Err(EngineError::RequestFailed(err)),
            None => Ok(chunk.response),
        }
    }

    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<FragmentStream> {
        debug!(model, prompt_chars = prompt.chars().count(), "opening generate stream");
        let response = self
            .post("/api/generate", &GenerateRequest { model, prompt, stream: true }, model)
            .await?;
        let bytes = response
            .bytes_stream()
            .map(|r| r.map_err(|e| EngineError::Disconnected(e.to_string())));
        let chunks = Box::pin(decode_stream::<_, _, GenerateChunk>(bytes));

        let fragments = stream::unfold((chunks, false), |(mut chunks, done)| async move {
            if done {
                return None;
            }
            loop {
                match chunks.next().await {
                    Some(Ok(chunk)) => {
                        if let Some(err) = chunk.error {
                            return Some((Err(EngineError::RequestFailed(err)), (chunks, true)));
                        }
                        if chunk.done {
                            if chunk.response.is_empty() {
                                return None;
                            }
                            return Some((Ok(chunk.response), (chunks, true)));
                        }
                        if !chunk.response.is_empty() {
                            return Some((Ok(chunk.response), (chunks, false)));
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), (chunks, true))),
                    None => {
                        warn!("generate stream closed before done");
                        let err = EngineError::Disconnected("stream ended before completion".into());
                        return Some((Err(err), (chunks, true)));
                    }
                }
            }
        });
        Ok(Box::pin(fragments))
    }

    async fn list_installed(&self) -> Result<Vec<String>> {
        let url = self.url("/api/tags");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::RequestFailed(format!("{url}: {e}")))?;
        let response = check_status(response, "").await?;
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse(format!("tags reply: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull(&self, model: &str) -> Result<ProgressStream> {
        let response = self.post("/api/pull", &PullRequest { model, stream: true }, model).await?;
        let bytes = response
            .bytes_stream()
            .map(|r| r.map_err(|e| EngineError::Disconnected(e.to_string())));
        let events = decode_stream::<_, _, PullLine>(bytes).map(|line| {
            let line = line?;
            match line.error {
                Some(err) => Err(EngineError::RequestFailed(err)),
                None => Ok(line.progress),
            }
        });
        Ok(Box::pin(events))
    }
}
