use localqa_core::config::Config;
use localqa_embed::get_default_embedder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Config::load()?.settings()?;
    let embedder = get_default_embedder(&settings.embedding, settings.embedding_base_url())?;
    let texts = vec!["hello world".to_string(), "rust embeddings".to_string()];
    let embs = embedder.embed_batch(&texts).await?;
    println!("{} B={} dim={}", embedder.embedder_id(), embs.len(), embedder.dim());
    Ok(())
}
