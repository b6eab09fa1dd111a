//! The question-answering pipeline.
//!
//! A query flows through the [`Router`](localqa_route::Router), the
//! optional [`Augmenter`], the model's prompt template and finally the
//! [`relay`] back to the caller. [`QaService`] ties these together with the
//! document store and the model registry.

pub mod augment;
pub mod error;
pub mod relay;
pub mod service;

pub use augment::{build_prompt, Augmentation, Augmenter};
pub use error::{Result, ServiceError};
pub use relay::{relay, Fragment, RelayResponse, RelayStream};
pub use service::{DocumentUpload, FailedUpload, IngestReport, QaService};
