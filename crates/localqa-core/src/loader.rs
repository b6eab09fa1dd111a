//! Format-specific document loaders, selected by file extension.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::traits::DocumentLoader;

/// Reads UTF-8 text files as a single segment, falling back to a lossy
/// decode for files with stray invalid bytes.
#[derive(Debug, Default)]
pub struct TextLoader;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "json", "log", "rst", "html", "xml", "yaml", "yml", "toml",
];

#[async_trait]
impl DocumentLoader for TextLoader {
    fn name(&self) -> &str {
        "text"
    }

    fn extensions(&self) -> &[&'static str] {
        TEXT_EXTENSIONS
    }

    async fn load(&self, path: &Path) -> Result<Vec<String>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                String::from_utf8_lossy(&tokio::fs::read(path).await?).to_string()
            }
            Err(e) => return Err(load_error(path, e)),
        };
        Ok(vec![content])
    }
}

/// Extracts PDF text with the `pdftotext` binary (poppler-utils), one
/// segment per page.
#[derive(Debug)]
pub struct PdfLoader {
    binary: String,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self { binary: "pdftotext".to_string() }
    }
}

impl PdfLoader {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    fn name(&self) -> &str {
        "pdf"
    }

    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    async fn load(&self, path: &Path) -> Result<Vec<String>> {
        info!(path = %path.display(), "extracting PDF text with {}", self.binary);
        let output = Command::new(&self.binary)
            .arg("-layout")
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| load_error(path, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(load_error(path, format!("{} exited with {}: {}", self.binary, output.status, stderr.trim())));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let pages = split_pages(&text);
        if pages.is_empty() {
            return Err(load_error(path, "no text extracted"));
        }
        debug!(path = %path.display(), pages = pages.len(), "pdf pages extracted");
        Ok(pages)
    }
}

/// `pdftotext` separates pages with form feeds.
fn split_pages(text: &str) -> Vec<String> {
    text.split('\u{c}')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn load_error(path: &Path, reason: impl ToString) -> Error {
    Error::Load { path: path.display().to_string(), reason: reason.to_string() }
}

/// Picks a loader by the lower-cased file extension.
#[derive(Clone)]
pub struct LoaderRegistry {
    loaders: Vec<Arc<dyn DocumentLoader>>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self { loaders: vec![Arc::new(PdfLoader::default()), Arc::new(TextLoader)] }
    }
}

impl LoaderRegistry {
    pub fn empty() -> Self {
        Self { loaders: Vec::new() }
    }

    /// Register a loader; later registrations win for shared extensions.
    pub fn register(&mut self, loader: Arc<dyn DocumentLoader>) {
        self.loaders.insert(0, loader);
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut exts: Vec<&'static str> = self.loaders.iter().flat_map(|l| l.extensions().iter().copied()).collect();
        exts.sort_unstable();
        exts.dedup();
        exts
    }

    pub fn for_path(&self, path: &Path) -> Result<Arc<dyn DocumentLoader>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| Error::UnsupportedFormat(format!("{} has no file extension", path.display())))?;
        self.loaders
            .iter()
            .find(|l| l.extensions().contains(&ext.as_str()))
            .cloned()
            .ok_or_else(|| Error::UnsupportedFormat(format!(".{ext} ({})", path.display())))
    }

    pub async fn load(&self, path: &Path) -> Result<Vec<String>> {
        self.for_path(path)?.load(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_split_on_form_feed() {
        let pages = split_pages("page one\n\u{c}page two\n\u{c}\n\u{c}");
        assert_eq!(pages, vec!["page one", "page two"]);
    }

    #[test]
    fn extension_selects_loader() {
        let registry = LoaderRegistry::default();
        assert_eq!(registry.for_path(Path::new("a/B.PDF")).map(|l| l.name().to_string()).ok(), Some("pdf".into()));
        assert_eq!(registry.for_path(Path::new("notes.md")).map(|l| l.name().to_string()).ok(), Some("text".into()));
        assert!(matches!(registry.for_path(Path::new("image.png")), Err(Error::UnsupportedFormat(_))));
        assert!(matches!(registry.for_path(Path::new("README")), Err(Error::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn text_loader_tolerates_invalid_utf8() {
        let dir = tempfile::tempdir().expect("tmp");
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, b"caf\xe9 au lait").expect("write");
        let segments = TextLoader.load(&path).await.expect("load");
        assert_eq!(segments.len(), 1);
        assert!(segments[0].starts_with("caf"));
        assert!(segments[0].ends_with("au lait"));
    }

    #[tokio::test]
    async fn missing_pdf_binary_is_a_load_error() {
        let dir = tempfile::tempdir().expect("tmp");
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4").expect("write");
        let loader = PdfLoader::with_binary("definitely-not-a-real-pdftotext");
        assert!(matches!(loader.load(&path).await, Err(Error::Load { .. })));
    }
}
