use localqa_core::config::{EmbeddingBackend, EmbeddingSettings};
use localqa_embed::{get_default_embedder, FakeEmbedder};

#[tokio::test]
async fn fake_embedder_shapes_and_determinism() {
    let settings = EmbeddingSettings { backend: EmbeddingBackend::Fake, dimension: 384, ..Default::default() };
    let embedder = get_default_embedder(&settings, "http://unused").expect("embedder");
    assert_eq!(embedder.embedder_id(), "fake:d384");

    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).await.expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 384);
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[tokio::test]
async fn single_embed_matches_batch() {
    use localqa_core::traits::Embedder;

    let e = FakeEmbedder::new(64);
    let one = e.embed("contract breach remedies").await.expect("embed");
    let batch = e.embed_batch(&["contract breach remedies".to_string()]).await.expect("batch");
    assert_eq!(one, batch[0]);
}

#[cfg(not(feature = "local-bge"))]
#[test]
fn local_backend_requires_feature() {
    let settings = EmbeddingSettings { backend: EmbeddingBackend::Local, ..Default::default() };
    assert!(matches!(
        get_default_embedder(&settings, "http://unused"),
        Err(localqa_core::Error::InvalidConfig(_))
    ));
}
