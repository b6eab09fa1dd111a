//! localqa-core
//!
//! Shared configuration, error taxonomy, data model, chunking and document
//! loading for the localqa workspace. Every other crate depends on this one.

pub mod config;
pub mod data_processor;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
