//! On-disk form of an index generation.
//!
//! One JSON document per index. Writes go to a temporary file in the
//! target directory which is then renamed over the previous snapshot, so a
//! reader of the path sees either the old or the new generation in full.

use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use localqa_core::types::DocumentChunk;
use localqa_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

/// One immutable, fully built version of the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexGeneration {
    pub generation: u64,
    pub embedder_id: String,
    pub dim: usize,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<IndexEntry>,
}

impl IndexGeneration {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct source documents, sorted.
    pub fn documents(&self) -> Vec<String> {
        let mut docs: Vec<String> = self.entries.iter().map(|e| e.chunk.doc_id.clone()).collect();
        docs.sort();
        docs.dedup();
        docs
    }
}

pub fn write_atomic(path: &Path, generation: &IndexGeneration) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(&mut writer, generation)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Index(format!("failed to replace {}: {}", path.display(), e.error)))?;
    debug!(path = %path.display(), generation = generation.generation, chunks = generation.len(), "snapshot written");
    Ok(())
}

/// `Ok(None)` when no snapshot exists.
pub fn read(path: &Path) -> Result<Option<IndexGeneration>> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let generation: IndexGeneration = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::Index(format!("corrupt snapshot {}: {e}", path.display())))?;
    Ok(Some(generation))
}

pub fn remove(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
