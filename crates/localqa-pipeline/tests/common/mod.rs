#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use localqa_engine::{EngineError, FragmentStream, GenerationEngine, ProgressStream, PullProgress};

/// How `generate_stream` behaves.
#[derive(Clone)]
pub enum Script {
    Reply(Vec<&'static str>),
    /// Yields the fragments, then a disconnect.
    DisconnectAfter(Vec<&'static str>),
    /// Rejects the request before any stream exists.
    Reject,
    /// Opens a stream whose first item is an error.
    FailFirst,
    /// Emits "tick" every 10ms until dropped.
    Endless,
}

/// Sets its flag when dropped.
pub struct DropFlag(pub Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct ScriptedEngine {
    pub script: Script,
    pub classifier_reply: String,
    pub installed: Vec<String>,
    /// `(model, prompt)` of every streamed generation.
    pub streamed: parking_lot::Mutex<Vec<(String, String)>>,
    pub classify_calls: parking_lot::Mutex<usize>,
    pub stream_dropped: Arc<AtomicBool>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            classifier_reply: "{\"domain\": \"general\"}".into(),
            installed: Vec::new(),
            streamed: parking_lot::Mutex::new(Vec::new()),
            classify_calls: parking_lot::Mutex::new(0),
            stream_dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn classifying(mut self, reply: &str) -> Self {
        self.classifier_reply = reply.to_string();
        self
    }

    pub fn with_installed(mut self, models: &[&str]) -> Self {
        self.installed = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn last_stream(&self) -> Option<(String, String)> {
        self.streamed.lock().last().cloned()
    }
}

#[async_trait]
impl GenerationEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _model: &str, _prompt: &str) -> localqa_engine::Result<String> {
        *self.classify_calls.lock() += 1;
        Ok(self.classifier_reply.clone())
    }

    async fn generate_stream(&self, model: &str, prompt: &str) -> localqa_engine::Result<FragmentStream> {
        self.streamed.lock().push((model.to_string(), prompt.to_string()));
        let guard = DropFlag(self.stream_dropped.clone());
        match self.script.clone() {
            Script::Reply(parts) => {
                let items: Vec<localqa_engine::Result<String>> = parts.into_iter().map(|p| Ok(p.to_string())).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Script::DisconnectAfter(parts) => {
                let mut items: Vec<localqa_engine::Result<String>> =
                    parts.into_iter().map(|p| Ok(p.to_string())).collect();
                items.push(Err(EngineError::Disconnected("connection reset".into())));
                items.push(Ok("never relayed".into()));
                Ok(Box::pin(stream::iter(items)))
            }
            Script::Reject => Err(EngineError::ModelNotFound(model.to_string())),
            Script::FailFirst => Ok(Box::pin(stream::iter(vec![Err::<String, _>(EngineError::Process(
                "exited with exit status: 1: out of memory".into(),
            ))]))),
            Script::Endless => Ok(Box::pin(stream::unfold(guard, |guard| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Some((Ok::<_, EngineError>("tick".to_string()), guard))
            }))),
        }
    }

    async fn list_installed(&self) -> localqa_engine::Result<Vec<String>> {
        Ok(self.installed.clone())
    }

    async fn pull(&self, model: &str) -> localqa_engine::Result<ProgressStream> {
        if model == "missing" {
            return Err(EngineError::ModelNotFound(model.to_string()));
        }
        let events = vec![
            Ok(PullProgress { status: "downloading".into(), total: Some(4), completed: Some(2) }),
            Ok(PullProgress::status("success")),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}
