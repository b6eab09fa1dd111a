//! Deterministic text chunking.
//!
//! Splits extracted document text with a recursive character splitter: the
//! text is cut on the coarsest separator present (`"\n\n"`, then `"\n"`, then
//! `" "`, then single characters), and the pieces are merged back into
//! chunks of at most `chunk_size` characters where consecutive chunks share
//! up to `chunk_overlap` characters of trailing pieces.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::config::{CHUNK_OVERLAP, CHUNK_SIZE};
use crate::types::DocumentChunk;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: CHUNK_SIZE, chunk_overlap: CHUNK_OVERLAP }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
}

impl DataProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(chunking_config: ChunkingConfig) -> Self {
        Self { chunking_config }
    }

    pub fn chunking_config(&self) -> ChunkingConfig {
        self.chunking_config
    }

    /// Chunk the ordered segments of one document. Chunk indices run across
    /// all segments; a chunk never spans two segments.
    pub fn process_segments(&self, doc_id: &str, doc_path: &Path, segments: &[String]) -> Vec<DocumentChunk> {
        let pieces: Vec<String> = segments.iter().flat_map(|s| self.split_text(s)).collect();
        let total_chunks = pieces.len();
        let doc_path = doc_path.to_string_lossy().to_string();
        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| DocumentChunk {
                id: format!("{doc_id}:{chunk_index}"),
                doc_id: doc_id.to_string(),
                doc_path: doc_path.clone(),
                content_hash: blake3::hash(content.as_bytes()).to_hex().to_string(),
                content,
                chunk_index,
                total_chunks,
            })
            .collect()
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() || text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in splits {
            if char_len(piece) < self.chunking_config.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge_splits(&fitting, separator));
                fitting.clear();
            }
            if remaining.is_empty() {
                if let Some(trimmed) = non_empty_trimmed(piece) {
                    chunks.push(trimmed);
                }
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge_splits(&fitting, separator));
        }
        chunks
    }

    fn merge_splits(&self, splits: &[&str], separator: &str) -> Vec<String> {
        let size = self.chunking_config.chunk_size;
        let overlap = self.chunking_config.chunk_overlap;
        let sep_len = char_len(separator);

        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;
        for &piece in splits {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { sep_len };
            if total + len + joiner > size && !current.is_empty() {
                if let Some(doc) = join_pieces(&current, separator) {
                    docs.push(doc);
                }
                // Drop leading pieces until what is left fits as overlap.
                while let Some(&first) = current.front() {
                    if total <= overlap && (total + len + sep_len <= size || total == 0) {
                        break;
                    }
                    let extra = if current.len() > 1 { sep_len } else { 0 };
                    total -= char_len(first) + extra;
                    current.pop_front();
                }
            }
            total += len + if current.is_empty() { 0 } else { sep_len };
            current.push_back(piece);
        }
        if let Some(doc) = join_pieces(&current, separator) {
            docs.push(doc);
        }
        docs
    }

    /// Every regular file under `root` whose extension is in `extensions`, sorted.
    pub fn list_files(&self, root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            let ext = path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase);
            if ext.is_some_and(|ext| extensions.contains(&ext.as_str())) {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        files
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn non_empty_trimmed(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

fn join_pieces(pieces: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    non_empty_trimmed(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(size: usize, overlap: usize) -> DataProcessor {
        DataProcessor::with_config(ChunkingConfig { chunk_size: size, chunk_overlap: overlap })
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = DataProcessor::new().split_text("Short text");
        assert_eq!(chunks, vec!["Short text".to_string()]);
    }

    #[test]
    fn whitespace_only_yields_nothing() {
        assert!(DataProcessor::new().split_text(" \n\n  \n").is_empty());
    }

    #[test]
    fn words_merge_with_overlap() {
        // 10 four-letter words, size 14 fits three words per chunk.
        let text = "aaaa bbbb cccc dddd eeee ffff gggg hhhh iiii jjjj";
        let chunks = processor(14, 5).split_text(text);
        assert_eq!(chunks[0], "aaaa bbbb cccc");
        assert_eq!(chunks[1], "cccc dddd eeee");
        for c in &chunks {
            assert!(c.chars().count() <= 14, "chunk too long: {c:?}");
        }
        assert_eq!(chunks.last().map(String::as_str), Some("iiii jjjj"));
    }

    #[test]
    fn long_word_falls_back_to_characters() {
        let text = "x".repeat(25);
        let chunks = processor(10, 2).split_text(&text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[1].len(), 10);
    }

    #[test]
    fn paragraphs_preferred_over_lines() {
        let text = format!("{}\n\n{}", "a ".repeat(200).trim(), "b ".repeat(200).trim());
        let chunks = DataProcessor::new().split_text(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with('a') && !chunks[0].contains('b'));
        assert!(chunks[1].starts_with('b'));
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "é".repeat(1200);
        let chunks = DataProcessor::new().split_text(&text);
        assert!(chunks.iter().all(|c| c.chars().count() <= CHUNK_SIZE));
    }
}
