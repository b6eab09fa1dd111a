//! `localqa`: ask questions against local models and manage the document
//! index.
//!
//! - `localqa ask` streams an answer, routing `auto` queries by domain
//! - `localqa ingest|delete|files|rebuild|status` manage retained documents
//! - `localqa models|pull|ensure` manage installed models

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use localqa_cli::{init_logging, load_settings, open_service, print_stats, progress_bar};
use localqa_core::types::{Query, AUTO_MODEL};
use localqa_pipeline::Fragment;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "localqa", about = "Local LLM question answering with retrieval", version)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding config.toml; data paths resolve against it.
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question and stream the answer.
    Ask {
        question: String,
        /// Model name, or `auto` to route by domain.
        #[arg(short, long, default_value = AUTO_MODEL)]
        model: String,
        /// Answer using context from ingested documents.
        #[arg(short, long)]
        rag: bool,
    },
    /// Retain and index documents.
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete a retained document and rebuild the index.
    Delete { name: String },
    /// List retained documents.
    Files,
    /// Rebuild the index from retained documents.
    Rebuild,
    /// Show index statistics.
    Status,
    /// List installed models.
    Models,
    /// Download a model.
    Pull { model: String },
    /// Pull every required model that is missing.
    Ensure,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (settings, base) = load_settings(cli.config_dir.as_deref())?;
    init_logging(&settings.logging, cli.verbose)?;
    let service = open_service(&settings, &base).await?;

    match cli.command {
        Command::Ask { question, model, rag } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let mut response = service.submit_query(Query::new(question, model, rag), cancel.clone()).await?;
            eprintln!("[model: {}]", response.model);
            let mut stdout = std::io::stdout().lock();
            let mut failed = false;
            while let Some(fragment) = response.stream.next().await {
                if let Fragment::Error(_) = fragment {
                    failed = true;
                    writeln!(stdout)?;
                }
                write!(stdout, "{}", fragment.as_str())?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
            if cancel.is_cancelled() {
                eprintln!("[cancelled]");
            }
            if failed {
                std::process::exit(1);
            }
        }
        Command::Ingest { files } => {
            let report = service.ingest_paths(&files).await?;
            for name in &report.files {
                println!("indexed  {name}");
            }
            for failed in &report.failed {
                println!("failed   {}: {}", failed.name, failed.reason);
            }
            if let Some(stats) = &report.stats {
                print_stats(stats);
            }
            if !report.success {
                std::process::exit(1);
            }
        }
        Command::Delete { name } => {
            if service.delete_document(&name).await? {
                println!("deleted {name}");
                print_stats(&service.index_stats());
            } else {
                eprintln!("no document named {name:?}");
                std::process::exit(1);
            }
        }
        Command::Files => {
            for name in service.list_documents()? {
                println!("{name}");
            }
        }
        Command::Rebuild => print_stats(&service.rebuild_index().await?),
        Command::Status => print_stats(&service.index_stats()),
        Command::Models => {
            for model in service.list_models().await? {
                println!("{model}");
            }
        }
        Command::Pull { model } => {
            let bar = progress_bar(0)?;
            bar.set_message(model.clone());
            let outcome = service
                .pull_model(&model, |p| {
                    if let Some(total) = p.total {
                        bar.set_length(total);
                    }
                    if let Some(done) = p.completed {
                        bar.set_position(done);
                    }
                    bar.set_message(p.status.clone());
                })
                .await;
            match outcome.error {
                None => bar.finish_with_message(format!("{model} ready")),
                Some(e) => {
                    bar.abandon_with_message(format!("{model} failed"));
                    anyhow::bail!("pull of {model} failed: {e}");
                }
            }
        }
        Command::Ensure => {
            let report = service.ensure_models().await;
            for model in &report.present {
                println!("present  {model}");
            }
            for model in &report.pulled {
                println!("pulled   {model}");
            }
            for failed in &report.failed {
                println!("failed   {}: {}", failed.model, failed.error.as_deref().unwrap_or("unknown error"));
            }
            if !report.failed.is_empty() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
