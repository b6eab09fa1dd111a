//! [`VectorStore`]: the process-wide vector index.
//!
//! Readers clone the current generation's `Arc` under a short read lock and
//! search that generation alone. Writers (ingest, rebuild, clear) are
//! serialized by an async mutex, build a complete new generation off to the
//! side, persist it, and only then swap it in.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use localqa_core::data_processor::DataProcessor;
use localqa_core::loader::LoaderRegistry;
use localqa_core::traits::Embedder;
use localqa_core::types::SearchHit;
use localqa_core::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::search::nearest;
use crate::snapshot::{self, IndexEntry, IndexGeneration};

const EMBED_BATCH: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub generation: u64,
    pub chunks: usize,
    pub documents: usize,
    pub embedder_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedDocument {
    pub name: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDocument {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of an ingest or rebuild. Failed documents are not in the index.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub indexed: Vec<IndexedDocument>,
    pub failed: Vec<FailedDocument>,
    pub stats: IndexStats,
}

pub struct VectorStore {
    embedder: Arc<dyn Embedder>,
    loaders: LoaderRegistry,
    processor: DataProcessor,
    snapshot_path: PathBuf,
    current: RwLock<Option<Arc<IndexGeneration>>>,
    last_generation: AtomicU64,
    writer: Mutex<()>,
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Index(format!("blocking task failed: {e}")))?
}

fn rebuild_failure(failed: &[FailedDocument]) -> Error {
    let details: Vec<String> = failed.iter().map(|f| format!("{}: {}", f.path.display(), f.reason)).collect();
    Error::Index(format!("rebuild aborted, {} document(s) failed: {}", failed.len(), details.join("; ")))
}

fn doc_id_for(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidName(path.display().to_string()))
}

/// Vectors of an earlier generation keyed by chunk content hash, usable as
/// long as the embedder has not changed.
fn reusable_vectors<'a>(previous: Option<&'a IndexGeneration>, embedder_id: &str) -> HashMap<&'a str, &'a [f32]> {
    match previous {
        Some(g) if g.embedder_id == embedder_id => g
            .entries
            .iter()
            .map(|e| (e.chunk.content_hash.as_str(), e.vector.as_slice()))
            .collect(),
        _ => HashMap::new(),
    }
}

impl VectorStore {
    /// An empty store persisting to `snapshot_path`. Use [`VectorStore::open`]
    /// to also load an existing snapshot.
    pub fn new(snapshot_path: impl Into<PathBuf>, embedder: Arc<dyn Embedder>, processor: DataProcessor) -> Self {
        Self {
            embedder,
            loaders: LoaderRegistry::default(),
            processor,
            snapshot_path: snapshot_path.into(),
            current: RwLock::new(None),
            last_generation: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    pub async fn open(snapshot_path: impl Into<PathBuf>, embedder: Arc<dyn Embedder>, processor: DataProcessor) -> Result<Self> {
        let store = Self::new(snapshot_path, embedder, processor);
        store.load().await?;
        Ok(store)
    }

    pub fn with_loaders(mut self, loaders: LoaderRegistry) -> Self {
        self.loaders = loaders;
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn loaders(&self) -> &LoaderRegistry {
        &self.loaders
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// The live generation, if any.
    pub fn current(&self) -> Option<Arc<IndexGeneration>> {
        self.current.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.current().map_or(true, |g| g.is_empty())
    }

    /// Replace the live generation with the persisted snapshot. Returns
    /// whether one was loaded. A snapshot from a different embedder is
    /// ignored and needs a rebuild.
    pub async fn load(&self) -> Result<bool> {
        let _guard = self.writer.lock().await;
        let path = self.snapshot_path.clone();
        let loaded = blocking(move || snapshot::read(&path)).await?;
        let generation = match loaded {
            None => {
                debug!(path = %self.snapshot_path.display(), "no index snapshot");
                return Ok(false);
            }
            Some(g) => g,
        };
        if generation.embedder_id != self.embedder.embedder_id() || generation.dim != self.embedder.dim() {
            warn!(
                snapshot_embedder = %generation.embedder_id,
                current_embedder = %self.embedder.embedder_id(),
                "index snapshot was built with a different embedder; rebuild required"
            );
            return Ok(false);
        }
        self.last_generation.fetch_max(generation.generation, Ordering::SeqCst);
        info!(generation = generation.generation, chunks = generation.len(), "index snapshot loaded");
        *self.current.write() = Some(Arc::new(generation));
        Ok(true)
    }

    /// Load, chunk and embed one document.
    async fn prepare_document(&self, path: &Path, reuse: &HashMap<&str, &[f32]>) -> Result<(String, Vec<IndexEntry>)> {
        let doc_id = doc_id_for(path)?;
        let segments = self.loaders.load(path).await?;
        let chunks = self.processor.process_segments(&doc_id, path, &segments);
        if chunks.is_empty() {
            return Err(Error::Load { path: path.display().to_string(), reason: "no text content".into() });
        }

        let missing: Vec<usize> = (0..chunks.len())
            .filter(|&i| !reuse.contains_key(chunks[i].content_hash.as_str()))
            .collect();
        let mut fresh = Vec::with_capacity(missing.len());
        for batch in missing.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|&i| chunks[i].content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(Error::Embedding(format!("expected {} vectors, got {}", texts.len(), vectors.len())));
            }
            fresh.extend(vectors);
        }
        debug!(doc = %doc_id, chunks = chunks.len(), embedded = fresh.len(), "document prepared");

        let dim = self.embedder.dim();
        let mut fresh = fresh.into_iter();
        let mut entries = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = match reuse.get(chunk.content_hash.as_str()) {
                Some(v) => v.to_vec(),
                None => fresh.next().ok_or_else(|| Error::Embedding("embedder returned too few vectors".into()))?,
            };
            if vector.len() != dim {
                return Err(Error::Embedding(format!("vector dimension {} != {dim}", vector.len())));
            }
            entries.push(IndexEntry { chunk, vector });
        }
        Ok((doc_id, entries))
    }

    /// Prepare every document, isolating failures.
    async fn prepare_all(
        &self,
        paths: &[PathBuf],
        reuse: &HashMap<&str, &[f32]>,
    ) -> (Vec<IndexedDocument>, Vec<FailedDocument>, Vec<IndexEntry>) {
        let mut indexed: Vec<IndexedDocument> = Vec::new();
        let mut failed = Vec::new();
        let mut entries: Vec<IndexEntry> = Vec::new();
        for path in paths {
            match self.prepare_document(path, reuse).await {
                Ok((doc_id, doc_entries)) => {
                    info!(doc = %doc_id, chunks = doc_entries.len(), "document indexed");
                    indexed.retain(|d| d.name != doc_id);
                    entries.retain(|e| e.chunk.doc_id != doc_id);
                    indexed.push(IndexedDocument { name: doc_id, chunks: doc_entries.len() });
                    entries.extend(doc_entries);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "document skipped");
                    failed.push(FailedDocument { path: path.clone(), reason: e.to_string() });
                }
            }
        }
        (indexed, failed, entries)
    }

    /// Persist a new generation built from `entries` and make it live.
    /// Callers hold the writer lock.
    async fn publish(&self, entries: Vec<IndexEntry>) -> Result<Arc<IndexGeneration>> {
        let generation = self.last_generation.load(Ordering::SeqCst) + 1;
        let next = Arc::new(IndexGeneration {
            generation,
            embedder_id: self.embedder.embedder_id().to_string(),
            dim: self.embedder.dim(),
            created_at: Utc::now(),
            entries,
        });
        let path = self.snapshot_path.clone();
        let to_write = Arc::clone(&next);
        blocking(move || snapshot::write_atomic(&path, &to_write)).await?;
        self.last_generation.store(generation, Ordering::SeqCst);
        *self.current.write() = Some(Arc::clone(&next));
        info!(generation, chunks = next.len(), documents = next.documents().len(), "index generation published");
        Ok(next)
    }

    async fn clear_locked(&self) -> Result<()> {
        let path = self.snapshot_path.clone();
        blocking(move || snapshot::remove(&path)).await?;
        *self.current.write() = None;
        info!("index cleared");
        Ok(())
    }

    /// Add documents to the index. Chunks of a document already indexed
    /// under the same name are replaced.
    pub async fn ingest(&self, paths: &[PathBuf]) -> Result<BuildReport> {
        let _guard = self.writer.lock().await;
        let start = Instant::now();
        let previous = self.current();
        let reuse = reusable_vectors(previous.as_deref(), self.embedder.embedder_id());
        let (indexed, failed, new_entries) = self.prepare_all(paths, &reuse).await;
        if !indexed.is_empty() {
            let replaced: HashSet<&str> = indexed.iter().map(|d| d.name.as_str()).collect();
            let mut entries: Vec<IndexEntry> = previous
                .iter()
                .flat_map(|g| g.entries.iter())
                .filter(|e| !replaced.contains(e.chunk.doc_id.as_str()))
                .cloned()
                .collect();
            entries.extend(new_entries);
            self.publish(entries).await?;
        }
        info!(
            indexed = indexed.len(),
            failed = failed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ingest finished"
        );
        Ok(BuildReport { indexed, failed, stats: self.stats() })
    }

    /// Rebuild the whole index from `paths`, the complete set of retained
    /// documents. Vectors of unchanged chunks are reused from the live
    /// generation.
    ///
    /// # Errors
    ///
    /// Fails without touching the live generation or its snapshot when any
    /// document fails to load or embed. The index is cleared only when
    /// `paths` is empty.
    pub async fn rebuild(&self, paths: &[PathBuf]) -> Result<BuildReport> {
        let _guard = self.writer.lock().await;
        let start = Instant::now();
        if paths.is_empty() {
            self.clear_locked().await?;
            return Ok(BuildReport { indexed: Vec::new(), failed: Vec::new(), stats: self.stats() });
        }
        let previous = self.current();
        let reuse = reusable_vectors(previous.as_deref(), self.embedder.embedder_id());
        let (indexed, failed, entries) = self.prepare_all(paths, &reuse).await;
        if !failed.is_empty() {
            warn!(failed = failed.len(), "rebuild aborted; keeping the live generation");
            return Err(rebuild_failure(&failed));
        }
        self.publish(entries).await?;
        info!(
            documents = indexed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "index rebuilt"
        );
        Ok(BuildReport { indexed, failed, stats: self.stats() })
    }

    /// Delete the snapshot, then drop the live generation.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.writer.lock().await;
        self.clear_locked().await
    }

    /// The `k` chunks nearest to `query`. Empty when there is no index.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let generation = match self.current() {
            Some(g) if !g.is_empty() && k > 0 => g,
            _ => return Ok(Vec::new()),
        };
        let vector = self.embedder.embed(query).await?;
        let hits = nearest(&generation, &vector, k)?;
        debug!(generation = generation.generation, hits = hits.len(), "search");
        Ok(hits)
    }

    pub fn stats(&self) -> IndexStats {
        match self.current() {
            Some(g) => IndexStats {
                generation: g.generation,
                chunks: g.len(),
                documents: g.documents().len(),
                embedder_id: g.embedder_id.clone(),
                created_at: Some(g.created_at),
            },
            None => IndexStats {
                generation: self.last_generation.load(Ordering::SeqCst),
                chunks: 0,
                documents: 0,
                embedder_id: self.embedder.embedder_id().to_string(),
                created_at: None,
            },
        }
    }
}
