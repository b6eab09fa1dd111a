//! Retained source documents, one file per indexed document.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use localqa_core::{Error, Result};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

/// Reject anything that is not a plain file name.
pub fn sanitize_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(&['/', '\\', '\0'][..])
        || trimmed.starts_with('.');
    if bad {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

/// A source path whose file name is already taken by an earlier path of
/// the same batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollision {
    pub path: PathBuf,
    pub kept: PathBuf,
}

/// Split `paths` into those with distinct file names (first one wins) and
/// the later ones that would overwrite them once stored by name.
pub fn split_name_collisions(paths: &[PathBuf]) -> (Vec<PathBuf>, Vec<NameCollision>) {
    let mut seen: HashMap<&OsStr, &PathBuf> = HashMap::new();
    let mut unique = Vec::new();
    let mut collisions = Vec::new();
    for path in paths {
        let Some(name) = path.file_name() else {
            unique.push(path.clone());
            continue;
        };
        match seen.get(name) {
            Some(kept) => collisions.push(NameCollision { path: path.clone(), kept: (*kept).clone() }),
            None => {
                seen.insert(name, path);
                unique.push(path.clone());
            }
        }
    }
    (unique, collisions)
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(sanitize_name(name)?))
    }

    /// Write `bytes` as `name`, replacing a previous upload of the same name.
    pub async fn save(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_of(name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, bytes).await?;
        info!(path = %path.display(), bytes = bytes.len(), "document saved");
        Ok(path)
    }

    /// Copy a local file into the store under its own file name.
    pub async fn import(&self, source: &Path) -> Result<PathBuf> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidName(source.display().to_string()))?;
        let path = self.path_of(name)?;
        if path == source {
            return Ok(path);
        }
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::copy(source, &path).await?;
        debug!(from = %source.display(), to = %path.display(), "document imported");
        Ok(path)
    }

    /// Removes `name`; `Ok(false)` when it was not stored.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let path = self.path_of(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "document removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Stored file names, sorted. A missing directory is an empty store.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .paths()?
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect())
    }

    pub fn paths(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_hidden = entry.file_name().to_str().map_or(true, |n| n.starts_with('.'));
            if !is_hidden {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path_of(name).map(|p| p.is_file()).unwrap_or(false)
    }
}
