//! Generation engine clients for a local Ollama installation.
//!
//! One [`GenerationEngine`] trait with two backends chosen by
//! `engine.backend`: [`OllamaHttpEngine`] speaks the REST API and
//! [`OllamaCliEngine`] drives the `ollama` binary.

use std::sync::Arc;

use localqa_core::config::{EngineBackend, EngineSettings};
use tracing::info;

pub mod cli;
pub mod engine;
pub mod error;
pub mod http;
pub mod ndjson;

pub use cli::OllamaCliEngine;
pub use engine::{FragmentStream, GenerationEngine, ProgressStream, PullProgress};
pub use error::{EngineError, Result};
pub use http::OllamaHttpEngine;

/// Build the configured backend.
pub fn build_engine(settings: &EngineSettings) -> Arc<dyn GenerationEngine> {
    match settings.backend {
        EngineBackend::Http => {
            info!(base_url = %settings.base_url, "using Ollama HTTP engine");
            Arc::new(OllamaHttpEngine::new(&settings.base_url))
        }
        EngineBackend::Cli => {
            info!(binary = %settings.binary, "using Ollama CLI engine");
            Arc::new(OllamaCliEngine::new(settings.binary.clone()))
        }
    }
}
