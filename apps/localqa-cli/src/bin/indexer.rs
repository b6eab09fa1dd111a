//! Bulk indexer: retains and indexes every supported file under a directory.
//!
//! Usage: `localqa-indexer <dir> [--batch N] [--rebuild]`

use std::path::PathBuf;

use clap::Parser;
use localqa_cli::{init_logging, load_settings, print_stats, progress_bar};
use localqa_core::data_processor::DataProcessor;
use localqa_pipeline::{FailedUpload, QaService};
use localqa_vector::split_name_collisions;

#[derive(Parser)]
#[command(name = "localqa-indexer", about = "Index a directory of documents", version)]
struct Args {
    /// Directory to scan recursively.
    dir: PathBuf,
    /// Files per ingest call; each call publishes one index generation.
    #[arg(long, default_value_t = 16)]
    batch: usize,
    /// Rebuild the index from all retained documents afterwards.
    #[arg(long)]
    rebuild: bool,
    #[arg(short, long)]
    config_dir: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let (settings, base) = load_settings(args.config_dir.as_deref())?;
    init_logging(&settings.logging, args.verbose)?;
    let service = QaService::from_settings(&settings, &base).await?;

    let extensions = service.store().loaders().supported_extensions();
    let files = DataProcessor::new().list_files(&args.dir, &extensions);
    if files.is_empty() {
        println!("no supported files under {} ({})", args.dir.display(), extensions.join(", "));
        return Ok(());
    }

    // Documents are stored by file name, so the first path per name wins.
    let (unique, collisions) = split_name_collisions(&files);
    let mut failed: Vec<FailedUpload> = collisions.into_iter().map(FailedUpload::from).collect();

    let bar = progress_bar(files.len() as u64)?;
    bar.set_message("indexing");
    bar.inc(failed.len() as u64);
    let mut indexed = 0usize;
    for batch in unique.chunks(args.batch.max(1)) {
        let report = service.ingest_paths(batch).await?;
        indexed += report.files.len();
        failed.extend(report.failed);
        bar.inc(batch.len() as u64);
    }
    bar.finish_with_message("done");

    println!("indexed {indexed} of {} files", files.len());
    for f in &failed {
        println!("failed   {}: {}", f.name, f.reason);
    }
    let stats = if args.rebuild { service.rebuild_index().await? } else { service.index_stats() };
    print_stats(&stats);
    Ok(())
}
