//! Installed-model cache and the required-model baseline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use localqa_core::config::Settings;
use localqa_engine::{EngineError, GenerationEngine, PullProgress};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::fuzzy::base_name;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullOutcome {
    pub model: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnsureReport {
    pub present: Vec<String>,
    pub pulled: Vec<String>,
    pub failed: Vec<PullOutcome>,
}

pub struct ModelRegistry {
    engine: Arc<dyn GenerationEngine>,
    required: Vec<String>,
    pull_timeout: Duration,
    list_timeout: Duration,
    installed: RwLock<Vec<String>>,
}

/// `model` counts as installed when listed verbatim, or when it has no tag
/// and some tag of it is listed.
pub fn is_installed(installed: &[String], model: &str) -> bool {
    installed
        .iter()
        .any(|m| m == model || (!model.contains(':') && base_name(m) == model))
}

async fn drive_pull<F>(engine: &dyn GenerationEngine, model: &str, on_progress: &mut F) -> Result<(), EngineError>
where
    F: FnMut(&PullProgress) + Send,
{
    let mut events = engine.pull(model).await?;
    let mut succeeded = false;
    while let Some(event) = events.next().await {
        let event = event?;
        on_progress(&event);
        succeeded |= event.is_success();
    }
    if succeeded {
        Ok(())
    } else {
        Err(EngineError::InvalidResponse("pull ended without a success status".into()))
    }
}

impl ModelRegistry {
    pub fn new(engine: Arc<dyn GenerationEngine>, required: Vec<String>, pull_timeout: Duration, list_timeout: Duration) -> Self {
        Self { engine, required, pull_timeout, list_timeout, installed: RwLock::new(Vec::new()) }
    }

    pub fn from_settings(engine: Arc<dyn GenerationEngine>, settings: &Settings) -> Self {
        Self::new(
            engine,
            settings.required_models(),
            Duration::from_secs(settings.models.pull_timeout_secs),
            Duration::from_secs(settings.models.list_timeout_secs),
        )
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// The cached installed list from the last refresh.
    pub fn installed(&self) -> Vec<String> {
        self.installed.read().clone()
    }

    /// Ask the engine for its installed models.
    pub async fn list_installed(&self) -> Result<Vec<String>, EngineError> {
        tokio::time::timeout(self.list_timeout, self.engine.list_installed())
            .await
            .map_err(|_| EngineError::Timeout)?
    }

    /// Re-list installed models and update the cache.
    pub async fn refresh(&self) -> Result<Vec<String>, EngineError> {
        let models = self.list_installed().await?;
        *self.installed.write() = models.clone();
        Ok(models)
    }

    pub async fn pull(&self, model: &str) -> PullOutcome {
        self.pull_with_progress(model, |_| {}).await
    }

    /// Pull `model`, passing each progress event to `on_progress`. Never
    /// fails; the outcome records the error.
    pub async fn pull_with_progress<F>(&self, model: &str, mut on_progress: F) -> PullOutcome
    where
        F: FnMut(&PullProgress) + Send,
    {
        let start = Instant::now();
        info!(model, "pulling model");
        let result = tokio::time::timeout(self.pull_timeout, drive_pull(self.engine.as_ref(), model, &mut on_progress)).await;
        let error = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("timed out after {}s", self.pull_timeout.as_secs())),
        };
        match &error {
            None => {
                info!(model, elapsed_ms = start.elapsed().as_millis() as u64, "model pulled");
                let mut installed = self.installed.write();
                if !installed.iter().any(|m| m == model) {
                    installed.push(model.to_string());
                }
            }
            Some(e) => warn!(model, error = %e, "model pull failed"),
        }
        PullOutcome { model: model.to_string(), success: error.is_none(), error }
    }

    /// Pull every required model that is not installed. Failures are
    /// reported, never raised.
    pub async fn ensure_required(&self) -> EnsureReport {
        let installed = match self.refresh().await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "could not list installed models; pulling every required model");
                Vec::new()
            }
        };
        let mut report = EnsureReport::default();
        for model in &self.required {
            if is_installed(&installed, model) {
                report.present.push(model.clone());
                continue;
            }
            let outcome = self.pull(model).await;
            if outcome.success {
                report.pulled.push(model.clone());
            } else {
                report.failed.push(outcome);
            }
        }
        info!(
            present = report.present.len(),
            pulled = report.pulled.len(),
            failed = report.failed.len(),
            "required models checked"
        );
        report
    }
}
