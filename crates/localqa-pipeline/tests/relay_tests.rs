mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{Script, ScriptedEngine};
use futures::StreamExt;
use localqa_pipeline::{relay, Fragment, ServiceError};
use tokio_util::sync::CancellationToken;

fn texts(parts: &[&str]) -> Vec<Fragment> {
    parts.iter().map(|p| Fragment::Text(p.to_string())).collect()
}

#[tokio::test]
async fn fragments_arrive_in_order() {
    let engine = ScriptedEngine::new(Script::Reply(vec!["Hello", ", ", "world"]));
    let response = relay(&engine, "llama3", "hi", CancellationToken::new()).await.expect("relay");
    assert_eq!(response.model, "llama3");
    let fragments: Vec<Fragment> = response.stream.collect().await;
    assert_eq!(fragments, texts(&["Hello", ", ", "world"]));
}

#[tokio::test]
async fn disconnect_mid_stream_yields_one_error_fragment_then_ends() {
    let engine = ScriptedEngine::new(Script::DisconnectAfter(vec!["a", "b"]));
    let response = relay(&engine, "llama3", "hi", CancellationToken::new()).await.expect("relay");
    let fragments: Vec<Fragment> = response.stream.collect().await;
    assert_eq!(fragments.len(), 3);
    assert_eq!(&fragments[..2], &texts(&["a", "b"])[..]);
    assert_eq!(fragments[2], Fragment::Error("Error running model: disconnected: connection reset".into()));
}

#[tokio::test]
async fn rejected_request_is_a_generation_failure() {
    let engine = ScriptedEngine::new(Script::Reject);
    let err = relay(&engine, "ghost", "hi", CancellationToken::new()).await.expect_err("rejected");
    match err {
        ServiceError::GenerationFailure { model, .. } => assert_eq!(model, "ghost"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn error_as_first_item_is_a_generation_failure() {
    let engine = ScriptedEngine::new(Script::FailFirst);
    let err = relay(&engine, "llama3", "hi", CancellationToken::new()).await.expect_err("first item fails");
    assert!(matches!(err, ServiceError::GenerationFailure { .. }));
    assert!(err.to_string().starts_with("Error running model:"));
}

#[tokio::test]
async fn empty_reply_is_an_empty_stream() {
    let engine = ScriptedEngine::new(Script::Reply(vec![]));
    let response = relay(&engine, "llama3", "hi", CancellationToken::new()).await.expect("relay");
    assert_eq!(response.collect_text().await, "");
}

#[tokio::test]
async fn cancellation_ends_stream_and_releases_engine() {
    let engine = ScriptedEngine::new(Script::Endless);
    let cancel = CancellationToken::new();
    let mut response = relay(&engine, "llama3", "hi", cancel.clone()).await.expect("relay");
    assert_eq!(response.stream.next().await, Some(Fragment::Text("tick".into())));
    assert_eq!(response.stream.next().await, Some(Fragment::Text("tick".into())));

    cancel.cancel();
    let next = tokio::time::timeout(Duration::from_secs(1), response.stream.next()).await.expect("ends promptly");
    assert_eq!(next, None);
    assert!(engine.stream_dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancelled_before_first_fragment_yields_nothing() {
    let engine = ScriptedEngine::new(Script::Endless);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let response = relay(&engine, "llama3", "hi", cancel).await.expect("relay");
    let fragments: Vec<Fragment> = response.stream.collect().await;
    assert!(fragments.is_empty());
    assert!(engine.stream_dropped.load(Ordering::SeqCst));
}
