//! Setup shared by the `localqa` binaries.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use localqa_core::config::{expand_path, Config, LoggingSettings, Settings};
use localqa_pipeline::QaService;
use localqa_vector::IndexStats;
use tracing_subscriber::EnvFilter;

/// Load settings from `config.toml` (and the `RUST_ENV` overlay) in `dir`.
/// Relative data paths resolve against the same directory.
pub fn load_settings(dir: Option<&Path>) -> anyhow::Result<(Settings, PathBuf)> {
    let dir = dir.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let env_name = std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = Config::load_from(&dir, &env_name).context("loading configuration")?;
    Ok((config.settings()?, dir))
}

/// Logs go to stderr, or are appended to `logging.file`. `RUST_LOG`
/// overrides the default level.
pub fn init_logging(settings: &LoggingSettings, verbose: bool) -> anyhow::Result<()> {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    match &settings.file {
        Some(file) => {
            let path = expand_path(file);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Build the service; pulls missing models first when
/// `models.pull_on_start` is set.
pub async fn open_service(settings: &Settings, base: &Path) -> anyhow::Result<QaService> {
    let service = QaService::from_settings(settings, base).await?;
    if settings.models.pull_on_start {
        let report = service.ensure_models().await;
        for failed in &report.failed {
            eprintln!(
                "warning: could not pull {}: {}",
                failed.model,
                failed.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(service)
}

pub fn progress_bar(len: u64) -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg:<24} [{bar:40}] {pos}/{len} ({eta})")?.progress_chars("=> "),
    );
    Ok(bar)
}

pub fn print_stats(stats: &IndexStats) {
    if stats.chunks == 0 {
        println!("index empty");
        return;
    }
    println!("generation: {}", stats.generation);
    println!("documents:  {}", stats.documents);
    println!("chunks:     {}", stats.chunks);
    println!("embedder:   {}", stats.embedder_id);
    if let Some(created) = stats.created_at {
        println!("built:      {}", created.to_rfc3339());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_load_from_directory() {
        let dir = tempfile::tempdir().expect("tmp");
        std::fs::write(
            dir.path().join("config.toml"),
            "[routing]\ndefault_model = \"mistral\"\n\n[retrieval]\ntop_k = 2\n",
        )
        .expect("write");
        let (settings, base) = load_settings(Some(dir.path())).expect("settings");
        assert_eq!(settings.routing.default_model, "mistral");
        assert_eq!(settings.retrieval.top_k, 2);
        assert_eq!(base, dir.path());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().expect("tmp");
        std::fs::write(dir.path().join("config.toml"), "[retrieval]\ntop_k = 0\n").expect("write");
        assert!(load_settings(Some(dir.path())).is_err());
    }
}
