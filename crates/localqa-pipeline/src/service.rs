//! [`QaService`]: the query and document operations behind every front end.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use localqa_core::config::Settings;
use localqa_core::data_processor::{ChunkingConfig, DataProcessor};
use localqa_core::traits::Embedder;
use localqa_core::types::Query;
use localqa_embed::get_default_embedder;
use localqa_engine::{build_engine, GenerationEngine, PullProgress};
use localqa_route::{render_for_model, EnsureReport, ModelRegistry, PullOutcome, Router};
use localqa_vector::{split_name_collisions, DocumentStore, IndexStats, NameCollision, VectorStore};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::augment::Augmenter;
use crate::error::Result;
use crate::relay::{relay, RelayResponse};

/// A document handed to [`QaService::ingest_documents`].
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), bytes: bytes.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUpload {
    pub name: String,
    pub reason: String,
}

impl From<NameCollision> for FailedUpload {
    fn from(c: NameCollision) -> Self {
        Self {
            name: c.path.display().to_string(),
            reason: format!("duplicate document name, already taken by {}", c.kept.display()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// True when every upload was indexed.
    pub success: bool,
    pub files: Vec<String>,
    pub failed: Vec<FailedUpload>,
    pub stats: Option<IndexStats>,
}

pub struct QaService {
    engine: Arc<dyn GenerationEngine>,
    router: Router,
    registry: ModelRegistry,
    store: Arc<VectorStore>,
    documents: DocumentStore,
    augmenter: Augmenter,
}

impl QaService {
    /// Build the engine and embedder named in `settings`. Relative data
    /// paths resolve against `base`.
    pub async fn from_settings(settings: &Settings, base: &Path) -> Result<Self> {
        let engine = build_engine(&settings.engine);
        let embedder = get_default_embedder(&settings.embedding, settings.embedding_base_url())?;
        Self::new(engine, embedder, settings, base).await
    }

    pub async fn new(
        engine: Arc<dyn GenerationEngine>,
        embedder: Arc<dyn Embedder>,
        settings: &Settings,
        base: &Path,
    ) -> Result<Self> {
        let processor = DataProcessor::with_config(ChunkingConfig {
            chunk_size: settings.retrieval.chunk_size,
            chunk_overlap: settings.retrieval.chunk_overlap,
        });
        let store = Arc::new(VectorStore::open(settings.data.index_file_path(base), embedder, processor).await?);
        let documents = DocumentStore::new(settings.data.upload_dir_path(base));
        let router = Router::from_settings(engine.clone(), &settings.routing);
        let registry = ModelRegistry::from_settings(engine.clone(), settings);
        let augmenter = Augmenter::new(store.clone(), settings.retrieval.top_k);
        info!(
            engine = engine.name(),
            uploads = %documents.root().display(),
            chunks = store.stats().chunks,
            "service ready"
        );
        Ok(Self { engine, router, registry, store, documents, augmenter })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Route, optionally augment, template and stream one query.
    ///
    /// The returned [`RelayResponse::model`] is the model actually used.
    pub async fn submit_query(&self, query: Query, cancel: CancellationToken) -> Result<RelayResponse> {
        let start = Instant::now();
        let available = if query.is_auto() { self.available_models().await } else { Vec::new() };
        let decision = self.router.route(&query, &available).await;
        let augmentation = self.augmenter.augment(&query.text, query.use_retrieval).await;
        let prompt = render_for_model(&decision.model, &augmentation.prompt);
        info!(
            model = %decision.model,
            domain = ?decision.domain,
            reason = ?decision.reason,
            context_chunks = augmentation.hits.len(),
            "query routed"
        );
        let response = relay(self.engine.as_ref(), &decision.model, &prompt, cancel).await?;
        debug!(model = %response.model, first_fragment_ms = start.elapsed().as_millis() as u64, "stream open");
        Ok(response)
    }

    /// Installed models for routing; the cache is refreshed when empty.
    async fn available_models(&self) -> Vec<String> {
        let cached = self.registry.installed();
        if !cached.is_empty() {
            return cached;
        }
        match self.registry.refresh().await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "could not list installed models; routing to configured names");
                Vec::new()
            }
        }
    }

    /// Retain and index uploaded documents. Files that fail to index are
    /// not retained.
    pub async fn ingest_documents(&self, uploads: Vec<DocumentUpload>) -> Result<IngestReport> {
        let mut staged = Vec::new();
        let mut failed = Vec::new();
        for upload in uploads {
            let existed = self.documents.contains(&upload.name);
            match self.documents.save(&upload.name, &upload.bytes).await {
                Ok(path) => staged.push((upload.name, path, existed)),
                Err(e) => failed.push(FailedUpload { name: upload.name, reason: e.to_string() }),
            }
        }
        self.index_staged(staged, failed).await
    }

    /// Copy files from disk into the document store and index them.
    pub async fn ingest_paths(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        let (unique, collisions) = split_name_collisions(paths);
        let mut staged = Vec::new();
        let mut failed: Vec<FailedUpload> = collisions
            .into_iter()
            .map(|c| {
                warn!(path = %c.path.display(), kept = %c.kept.display(), "duplicate document name");
                FailedUpload::from(c)
            })
            .collect();
        for source in &unique {
            let name = source.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let existed = self.documents.contains(&name);
            match self.documents.import(source).await {
                Ok(path) => staged.push((name, path, existed)),
                Err(e) => failed.push(FailedUpload { name: source.display().to_string(), reason: e.to_string() }),
            }
        }
        self.index_staged(staged, failed).await
    }

    async fn index_staged(
        &self,
        staged: Vec<(String, PathBuf, bool)>,
        mut failed: Vec<FailedUpload>,
    ) -> Result<IngestReport> {
        if staged.is_empty() {
            return Ok(IngestReport { success: failed.is_empty(), files: Vec::new(), failed, stats: None });
        }
        let paths: Vec<PathBuf> = staged.iter().map(|(_, p, _)| p.clone()).collect();
        let report = match self.store.ingest(&paths).await {
            Ok(report) => report,
            Err(e) => {
                for (name, _, existed) in &staged {
                    if !existed {
                        self.discard(name).await;
                    }
                }
                return Err(e.into());
            }
        };

        let mut replaced_failed = false;
        for doc in &report.failed {
            let Some((name, _, existed)) = staged.iter().find(|(_, p, _)| *p == doc.path) else {
                continue;
            };
            self.discard(name).await;
            replaced_failed |= *existed;
            failed.push(FailedUpload { name: name.clone(), reason: doc.reason.clone() });
        }
        let mut stats = report.stats;
        if replaced_failed {
            // An earlier version of a rejected file may still have chunks.
            stats = self.rebuild_index().await?;
        }
        let files = report.indexed.into_iter().map(|d| d.name).collect();
        info!(failed = failed.len(), chunks = stats.chunks, "documents ingested");
        Ok(IngestReport { success: failed.is_empty(), files, failed, stats: Some(stats) })
    }

    async fn discard(&self, name: &str) {
        if let Err(e) = self.documents.remove(name).await {
            warn!(name, error = %e, "failed to remove rejected document");
        }
    }

    /// Delete a retained document and rebuild the index without it.
    /// Returns `false` when no such document exists.
    ///
    /// The file is removed only after the new generation is published, so
    /// a failed rebuild leaves both the document and the index as they were
    /// and the delete can be retried.
    pub async fn delete_document(&self, name: &str) -> Result<bool> {
        let target = self.documents.path_of(name)?;
        if !target.is_file() {
            debug!(name, "delete of unknown document");
            return Ok(false);
        }
        let remaining: Vec<PathBuf> = self.documents.paths()?.into_iter().filter(|p| *p != target).collect();
        self.store.rebuild(&remaining).await?;
        self.documents.remove(name).await?;
        info!(name, "document deleted");
        Ok(true)
    }

    pub fn list_documents(&self) -> Result<Vec<String>> {
        Ok(self.documents.list()?)
    }

    /// Re-index every retained document. Fails, keeping the live index,
    /// when any of them cannot be indexed.
    pub async fn rebuild_index(&self) -> Result<IndexStats> {
        let paths = self.documents.paths()?;
        Ok(self.store.rebuild(&paths).await?.stats)
    }

    pub fn index_stats(&self) -> IndexStats {
        self.store.stats()
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.registry.refresh().await?)
    }

    pub async fn pull_model<F>(&self, model: &str, on_progress: F) -> PullOutcome
    where
        F: FnMut(&PullProgress) + Send,
    {
        self.registry.pull_with_progress(model, on_progress).await
    }

    pub async fn ensure_models(&self) -> EnsureReport {
        self.registry.ensure_required().await
    }
}
