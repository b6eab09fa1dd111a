//! `OllamaCliEngine` driving a shell script that mimics the `ollama` binary.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use futures::StreamExt;
use tempfile::TempDir;

use localqa_engine::{EngineError, GenerationEngine, OllamaCliEngine};

const FAKE_OLLAMA: &str = r#"#!/bin/sh
case "$1" in
  run)
    if [ "$2" = "missing" ]; then
      echo "Error: model 'missing' not found" >&2
      exit 1
    fi
    if [ "$2" = "crashy" ]; then
      printf 'partial '
      echo "Error: llama runner process has terminated" >&2
      exit 2
    fi
    if [ "$2" = "cutoff" ]; then
      printf 'caf\303'
      echo "Error: llama runner process has terminated" >&2
      exit 2
    fi
    printf 'echo: %s' "$3"
    ;;
  list)
    echo "NAME              ID              SIZE      MODIFIED"
    echo "llama3:latest     365c0bd3c000    4.7 GB    2 days ago"
    echo "mistral:latest    f974a74358d6    4.1 GB    3 weeks ago"
    ;;
  pull)
    if [ "$2" = "nosuch" ]; then
      echo "Error: pull model manifest: file does not exist" >&2
      exit 1
    fi
    echo "pulling manifest" >&2
    ;;
esac
"#;

fn fake_binary() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("ollama");
    std::fs::write(&path, FAKE_OLLAMA).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    (dir, path)
}

fn engine(path: &PathBuf) -> OllamaCliEngine {
    OllamaCliEngine::new(path.to_string_lossy().to_string())
}

#[tokio::test]
async fn run_streams_stdout() {
    let (_dir, bin) = fake_binary();
    let reply = engine(&bin).generate("llama3", "hello there").await.expect("generate");
    assert_eq!(reply, "echo: hello there");
}

#[tokio::test]
async fn missing_model_is_first_item_error() {
    let (_dir, bin) = fake_binary();
    let mut stream = engine(&bin).generate_stream("missing", "x").await.expect("spawned");
    match stream.next().await {
        Some(Err(EngineError::ModelNotFound(m))) => assert!(m.contains("missing")),
        other => panic!("expected ModelNotFound, got {other:?}"),
    }
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn crash_after_output_ends_with_error() {
    let (_dir, bin) = fake_binary();
    let items: Vec<_> = engine(&bin).generate_stream("crashy", "x").await.expect("spawned").collect().await;
    let last = items.last().expect("items");
    assert!(matches!(last, Err(EngineError::Process(m)) if m.contains("terminated")));
    let text: String = items.iter().filter_map(|r| r.as_ref().ok()).cloned().collect();
    assert_eq!(text, "partial ");
}

#[tokio::test]
async fn unfinished_tail_is_yielded_before_exit_error() {
    let (_dir, bin) = fake_binary();
    let items: Vec<_> = engine(&bin).generate_stream("cutoff", "x").await.expect("spawned").collect().await;
    let (last, text_items) = items.split_last().expect("items");
    assert!(matches!(last, Err(EngineError::Process(m)) if m.contains("terminated")));
    assert!(text_items.iter().all(|r| r.is_ok()));
    let text: String = text_items.iter().filter_map(|r| r.as_ref().ok()).cloned().collect();
    assert_eq!(text, "caf\u{FFFD}");
}

#[tokio::test]
async fn list_parses_table() {
    let (_dir, bin) = fake_binary();
    let models = engine(&bin).list_installed().await.expect("list");
    assert_eq!(models, vec!["llama3:latest", "mistral:latest"]);
}

#[tokio::test]
async fn pull_success_and_failure() {
    let (_dir, bin) = fake_binary();
    let e = engine(&bin);
    let ok: Vec<_> = e.pull("phi").await.expect("pull").collect().await;
    assert!(ok.last().and_then(|r| r.as_ref().ok()).is_some_and(|p| p.is_success()));

    let failed: Vec<_> = e.pull("nosuch").await.expect("pull").collect().await;
    assert!(matches!(failed.last(), Some(Err(EngineError::Process(_)))));
}

#[tokio::test]
async fn missing_binary_fails_before_stream() {
    let e = OllamaCliEngine::new("/nonexistent/ollama-binary");
    assert!(matches!(e.generate_stream("llama3", "x").await, Err(EngineError::Process(_))));
}
