//! Streams engine output to the caller.
//!
//! A failure before the first fragment is returned as
//! [`ServiceError::GenerationFailure`]. After that the stream carries at most
//! one [`Fragment::Error`] and then ends. Cancelling the token or dropping the
//! stream releases the engine's connection or subprocess.

use std::fmt;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use localqa_engine::{EngineError, FragmentStream, GenerationEngine};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    /// Terminal; nothing follows it.
    Error(String),
}

impl Fragment {
    pub fn as_str(&self) -> &str {
        match self {
            Fragment::Text(s) | Fragment::Error(s) => s,
        }
    }
}

pub type RelayStream = Pin<Box<dyn Stream<Item = Fragment> + Send>>;

/// The fragment stream plus the model that actually serves it.
pub struct RelayResponse {
    pub model: String,
    pub stream: RelayStream,
}

impl fmt::Debug for RelayResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayResponse").field("model", &self.model).finish_non_exhaustive()
    }
}

impl RelayResponse {
    /// Concatenate every fragment, error text included.
    pub async fn collect_text(self) -> String {
        self.stream.map(|f| f.as_str().to_string()).collect::<Vec<_>>().await.concat()
    }
}

pub fn error_message(e: &EngineError) -> String {
    format!("Error running model: {e}")
}

struct RelayState {
    upstream: Option<FragmentStream>,
    pending: Option<String>,
    cancel: CancellationToken,
    model: String,
    relayed: usize,
}

impl RelayState {
    async fn next_upstream(&mut self) -> Option<std::result::Result<String, EngineError>> {
        let upstream = self.upstream.as_mut()?;
        let item = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = upstream.next() => Some(item),
        };
        match item {
            Some(item) => item,
            None => {
                debug!(model = %self.model, relayed = self.relayed, "relay cancelled");
                self.upstream = None;
                None
            }
        }
    }
}

/// Start `prompt` on `model` and wait for the first fragment.
pub async fn relay(
    engine: &dyn GenerationEngine,
    model: &str,
    prompt: &str,
    cancel: CancellationToken,
) -> Result<RelayResponse> {
    let failure = |source: EngineError| {
        warn!(model, error = %source, "generation failed to start");
        ServiceError::GenerationFailure { model: model.to_string(), source }
    };
    let upstream = engine.generate_stream(model, prompt).await.map_err(failure)?;
    let mut state = RelayState {
        upstream: Some(upstream),
        pending: None,
        cancel,
        model: model.to_string(),
        relayed: 0,
    };
    match state.next_upstream().await {
        Some(Ok(first)) => state.pending = Some(first),
        Some(Err(e)) => return Err(failure(e)),
        None => state.upstream = None,
    }

    let stream = stream::unfold(state, |mut st| async move {
        if let Some(text) = st.pending.take() {
            st.relayed += 1;
            return Some((Fragment::Text(text), st));
        }
        match st.next_upstream().await {
            Some(Ok(text)) => {
                st.relayed += 1;
                Some((Fragment::Text(text), st))
            }
            Some(Err(e)) => {
                warn!(model = %st.model, relayed = st.relayed, error = %e, "generation failed mid-stream");
                st.upstream = None;
                Some((Fragment::Error(error_message(&e)), st))
            }
            None => {
                debug!(model = %st.model, relayed = st.relayed, "relay finished");
                None
            }
        }
    });
    Ok(RelayResponse { model: model.to_string(), stream: Box::pin(stream) })
}
