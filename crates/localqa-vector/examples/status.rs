use std::path::Path;

use localqa_core::config::Config;
use localqa_core::data_processor::{ChunkingConfig, DataProcessor};
use localqa_embed::get_default_embedder;
use localqa_vector::{DocumentStore, VectorStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Config::load()?.settings()?;
    let base = Path::new(".");
    let embedder = get_default_embedder(&settings.embedding, settings.embedding_base_url())?;
    let processor = DataProcessor::with_config(ChunkingConfig {
        chunk_size: settings.retrieval.chunk_size,
        chunk_overlap: settings.retrieval.chunk_overlap,
    });
    let store = VectorStore::open(settings.data.index_file_path(base), embedder, processor).await?;
    let docs = DocumentStore::new(settings.data.upload_dir_path(base));

    let stats = store.stats();
    println!("snapshot:   {}", store.snapshot_path().display());
    println!("generation: {}", stats.generation);
    println!("chunks:     {}", stats.chunks);
    println!("documents:  {} indexed, {} retained", stats.documents, docs.list()?.len());
    println!("embedder:   {}", stats.embedder_id);
    if let Some(created) = stats.created_at {
        println!("built at:   {created}");
    }
    Ok(())
}
