//! Model selection: domain classification, routing, prompt templates and
//! the installed-model registry.

pub mod domain;
pub mod fuzzy;
pub mod registry;
pub mod router;
pub mod template;

pub use domain::{Classifier, ClassifierOutcome};
pub use fuzzy::ModelMatch;
pub use registry::{EnsureReport, ModelRegistry, PullOutcome};
pub use router::{RouteDecision, RouteReason, Router};
pub use template::{render_for_model, template_for, Template};
