//! The [`GenerationEngine`] trait shared by every backend.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use serde::Deserialize;

use crate::error::Result;

/// Text fragments in generation order. Dropping the stream releases the
/// underlying connection or subprocess.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Progress events of a model pull, ending with a `success` status.
pub type ProgressStream = Pin<Box<dyn Stream<Item = Result<PullProgress>> + Send>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
}

impl PullProgress {
    pub fn status(status: impl Into<String>) -> Self {
        Self { status: status.into(), ..Default::default() }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// A locally hosted text generation service.
///
/// Implementations speak one transport (REST or subprocess). Model
/// availability is checked by the engine itself at invocation time.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Backend name for logs (`"ollama-http"`, `"ollama-cli"`).
    fn name(&self) -> &str;

    /// Run `prompt` on `model` and return the whole reply.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let stream = self.generate_stream(model, prompt).await?;
        stream.try_collect::<Vec<String>>().await.map(|parts| parts.concat())
    }

    /// Run `prompt` on `model`, yielding fragments as the engine emits them.
    ///
    /// # Errors
    ///
    /// Fails before any fragment when the request is rejected or the
    /// process cannot be started. Later failures arrive as stream items.
    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<FragmentStream>;

    /// Names of the locally installed models.
    async fn list_installed(&self) -> Result<Vec<String>>;

    /// Fetch `model` into the local store.
    async fn pull(&self, model: &str) -> Result<ProgressStream>;
}
