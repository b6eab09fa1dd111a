//! Query -> domain -> model.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use localqa_core::config::RoutingSettings;
use localqa_core::types::{DomainLabel, Query};
use localqa_engine::GenerationEngine;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{code_keyword, Classifier};
use crate::fuzzy::{match_available, ModelMatch};
use crate::template::template_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// The caller named a model.
    Explicit,
    /// A code keyword forced the `code` domain.
    KeywordOverride,
    Classified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    pub model: String,
    /// `None` for explicitly requested models.
    pub domain: Option<DomainLabel>,
    pub reason: RouteReason,
    pub matched: Option<ModelMatch>,
}

pub struct Router {
    classifier: Classifier,
    domain_models: BTreeMap<DomainLabel, String>,
    default_model: String,
    fuzzy_cutoff: f64,
    code_keywords: Vec<String>,
}

impl Router {
    pub fn new(classifier: Classifier, routing: &RoutingSettings) -> Self {
        let mut domain_models = BTreeMap::new();
        for (key, model) in &routing.domain_models {
            match key.parse::<DomainLabel>() {
                Ok(domain) => {
                    domain_models.insert(domain, model.clone());
                }
                Err(e) => warn!(key = %key, error = %e, "ignoring unknown domain in routing table"),
            }
        }
        let router = Self {
            classifier,
            domain_models,
            default_model: routing.default_model.clone(),
            fuzzy_cutoff: routing.fuzzy_cutoff,
            code_keywords: routing.code_keywords.clone(),
        };
        for model in router.models_without_template() {
            warn!(model, "routed model has no prompt template; prompts will be sent verbatim");
        }
        router
    }

    pub fn from_settings(engine: Arc<dyn GenerationEngine>, routing: &RoutingSettings) -> Self {
        let classifier = Classifier::new(
            engine,
            routing.classifier_model.clone(),
            Duration::from_secs(routing.classify_timeout_secs),
        );
        Self::new(classifier, routing)
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn model_for_domain(&self, domain: DomainLabel) -> &str {
        self.domain_models.get(&domain).map_or(self.default_model.as_str(), String::as_str)
    }

    /// Models in the domain table (and the default) lacking a template.
    pub fn models_without_template(&self) -> Vec<&str> {
        let mut missing: Vec<&str> = self
            .domain_models
            .values()
            .map(String::as_str)
            .chain(std::iter::once(self.default_model.as_str()))
            .filter(|m| template_for(m).is_none())
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    /// Domain of `query`. A code keyword wins without asking the classifier.
    pub async fn detect_domain(&self, query: &str) -> (DomainLabel, RouteReason) {
        if let Some(keyword) = code_keyword(query, &self.code_keywords) {
            info!(keyword, "code keyword override");
            return (DomainLabel::Code, RouteReason::KeywordOverride);
        }
        let outcome = self.classifier.classify(query).await;
        let domain = outcome.resolve();
        info!(?outcome, %domain, "domain classified");
        (domain, RouteReason::Classified)
    }

    /// Resolve `wanted` against `available`, falling back to the default model.
    pub fn resolve_model(&self, wanted: &str, available: &[String]) -> (String, ModelMatch) {
        match match_available(wanted, available, self.fuzzy_cutoff) {
            Some(found) => found,
            None => {
                if !available.is_empty() {
                    warn!(wanted, default = %self.default_model, "no installed model matches; using default");
                }
                (self.default_model.clone(), ModelMatch::Default)
            }
        }
    }

    pub async fn route(&self, query: &Query, available: &[String]) -> RouteDecision {
        if !query.is_auto() {
            return RouteDecision {
                model: query.model.trim().to_string(),
                domain: None,
                reason: RouteReason::Explicit,
                matched: None,
            };
        }
        let (domain, reason) = self.detect_domain(&query.text).await;
        let wanted = self.model_for_domain(domain);
        let (model, matched) = self.resolve_model(wanted, available);
        info!(%domain, wanted, model = %model, ?matched, "query routed");
        RouteDecision { model, domain: Some(domain), reason, matched: Some(matched) }
    }
}
