//! `ollama` subprocess backend.
//!
//! Every request spawns the binary with `kill_on_drop`, so dropping a
//! stream or a pending future terminates the child.

use std::process::Stdio;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::{FragmentStream, GenerationEngine, ProgressStream, PullProgress};
use crate::error::{EngineError, Result};

const READ_CHUNK: usize = 4096;

pub struct OllamaCliEngine {
    binary: String,
}

impl OllamaCliEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    fn spawn(&self, args: &[&str]) -> Result<Child> {
        self.command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Process(format!("failed to start {}: {e}", self.binary)))
    }
}

/// Output of `ollama list`: a header row, then one model per line with the
/// name in the first column.
pub fn parse_list_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Drain a pipe to a string on a separate task so a chatty stderr never
/// blocks the child.
fn collect_pipe<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut out = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut out).await;
        }
        String::from_utf8_lossy(&out).trim().to_string()
    })
}

/// Split off the longest valid UTF-8 prefix of `pending`, keeping an
/// incomplete trailing sequence for the next read. Invalid bytes are
/// replaced.
fn take_utf8(pending: &mut Vec<u8>, eof: bool) -> String {
    match std::str::from_utf8(pending) {
        Ok(s) => {
            let out = s.to_string();
            pending.clear();
            out
        }
        Err(e) if e.error_len().is_none() && !eof => {
            let valid = e.valid_up_to();
            let rest = pending.split_off(valid);
            let out = String::from_utf8_lossy(pending).into_owned();
            *pending = rest;
            out
        }
        Err(_) => {
            let out = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            out
        }
    }
}

struct RunState {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    pending: Vec<u8>,
    /// Exit failure held back until the output tail has been yielded.
    exit_error: Option<EngineError>,
    done: bool,
}

impl RunState {
    async fn next_fragment(&mut self) -> Option<Result<String>> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            if self.done {
                return self.exit_error.take().map(Err);
            }
            let n = match self.stdout.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(EngineError::Disconnected(e.to_string())));
                }
            };
            if n == 0 {
                self.done = true;
                let tail = take_utf8(&mut self.pending, true);
                self.exit_error = self.check_exit().await.err();
                if tail.is_empty() {
                    return self.exit_error.take().map(Err);
                }
                return Some(Ok(tail));
            }
            self.pending.extend_from_slice(&buf[..n]);
            let text = take_utf8(&mut self.pending, false);
            if !text.is_empty() {
                return Some(Ok(text));
            }
        }
    }

    async fn check_exit(&mut self) -> Result<()> {
        let status = self.child.wait().await?;
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        if status.success() {
            return Ok(());
        }
        warn!(%status, stderr = %stderr, "ollama run failed");
        if stderr.contains("not found") {
            return Err(EngineError::ModelNotFound(stderr));
        }
        Err(EngineError::Process(format!("exited with {status}: {stderr}")))
    }
}

async fn wait_for_pull(child: Child, model: String) -> Result<PullProgress> {
    let output = child.wait_with_output().await?;
    if output.status.success() {
        return Ok(PullProgress::status("success"));
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(EngineError::Process(format!("pull {model} exited with {}: {}", output.status, stderr.trim())))
}

#[async_trait]
impl GenerationEngine for OllamaCliEngine {
    fn name(&self) -> &str {
        "ollama-cli"
    }

    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<FragmentStream> {
        debug!(model, binary = %self.binary, "spawning ollama run");
        let mut child = self.spawn(&["run", model, prompt])?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Process("stdout not captured".into()))?;
        let stderr = Some(collect_pipe(child.stderr.take()));
        let state = RunState { child, stdout, stderr, pending: Vec::new(), exit_error: None, done: false };
        let fragments = stream::unfold(state, |mut st| async move {
            let item = st.next_fragment().await?;
            Some((item, st))
        });
        Ok(Box::pin(fragments))
    }

    async fn list_installed(&self) -> Result<Vec<String>> {
        let output = self
            .command(&["list"])
            .output()
            .await
            .map_err(|e| EngineError::Process(format!("failed to start {}: {e}", self.binary)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Process(format!("list exited with {}: {}", output.status, stderr.trim())));
        }
        Ok(parse_list_output(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn pull(&self, model: &str) -> Result<ProgressStream> {
        debug!(model, "spawning ollama pull");
        let child = self.spawn(&["pull", model])?;
        let outcome = stream::once(wait_for_pull(child, model.to_string()));
        let started = stream::once(async { Ok::<_, EngineError>(PullProgress::status("pulling manifest")) });
        Ok(Box::pin(started.chain(outcome)))
    }
}
