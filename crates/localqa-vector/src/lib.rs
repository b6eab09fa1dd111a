//! Vector index over retained documents.
//!
//! - [`VectorStore`]: generation-swapped in-memory index with a JSON snapshot
//! - [`DocumentStore`]: the uploaded files the index is derived from

pub mod documents;
pub mod search;
pub mod snapshot;
pub mod store;

pub use documents::{sanitize_name, split_name_collisions, DocumentStore, NameCollision};
pub use snapshot::{IndexEntry, IndexGeneration};
pub use store::{BuildReport, FailedDocument, IndexStats, IndexedDocument, VectorStore};
