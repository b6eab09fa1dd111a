//! Domain classification of a query.
//!
//! The classifier model is asked for `{"domain": "<name>"}`. Its reply is
//! captured as a [`ClassifierOutcome`] and [`ClassifierOutcome::resolve`] is
//! the single place that turns any outcome into a [`DomainLabel`].

use std::sync::Arc;
use std::time::Duration;

use localqa_core::types::DomainLabel;
use localqa_engine::GenerationEngine;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierOutcome {
    /// The reply carried a JSON `domain` string (not yet checked).
    ParsedDomain(String),
    /// The reply was text without a usable JSON object.
    UnparsableOutput(String),
    /// Timeout or engine failure.
    Unavailable,
}

impl ClassifierOutcome {
    pub fn from_reply(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(domain) = domain_field(trimmed) {
            return Self::ParsedDomain(domain);
        }
        if let Some(domain) = first_json_object(trimmed).and_then(domain_field) {
            return Self::ParsedDomain(domain);
        }
        Self::UnparsableOutput(raw.to_string())
    }

    pub fn resolve(&self) -> DomainLabel {
        match self {
            Self::ParsedDomain(d) => d.parse().unwrap_or(DomainLabel::General),
            Self::UnparsableOutput(raw) => {
                let lower = raw.to_lowercase();
                DomainLabel::CLASSIFIABLE
                    .into_iter()
                    .find(|d| lower.contains(d.as_str()))
                    .unwrap_or(DomainLabel::General)
            }
            Self::Unavailable => DomainLabel::General,
        }
    }
}

fn domain_field(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value.get("domain")?.as_str().map(str::to_string)
}

/// The first balanced `{...}` in `text`, skipping braces inside strings.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn classifier_prompt(query: &str) -> String {
    let domains: Vec<&str> = DomainLabel::ALL.iter().map(|d| d.as_str()).collect();
    format!(
        "Classify the user's question into exactly one of these domains: {}.\n\
         Reply with only a JSON object of the form {{\"domain\": \"<name>\"}} and nothing else.\n\n\
         Question: {query}",
        domains.join(", ")
    )
}

/// The configured code keyword appearing in `query` as a whole word, if any.
/// Words may contain `+` and `#` so `c++` and `c#` match.
pub fn code_keyword<'a>(query: &str, keywords: &'a [String]) -> Option<&'a str> {
    let lower = query.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|w| !w.is_empty())
        .collect();
    keywords
        .iter()
        .find(|k| words.iter().any(|w| w.eq_ignore_ascii_case(k.trim())))
        .map(String::as_str)
}

/// Asks the classifier model for a domain, bounded by a timeout.
pub struct Classifier {
    engine: Arc<dyn GenerationEngine>,
    model: String,
    timeout: Duration,
}

impl Classifier {
    pub fn new(engine: Arc<dyn GenerationEngine>, model: impl Into<String>, timeout: Duration) -> Self {
        Self { engine, model: model.into(), timeout }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn classify(&self, query: &str) -> ClassifierOutcome {
        let prompt = classifier_prompt(query);
        match tokio::time::timeout(self.timeout, self.engine.generate(&self.model, &prompt)).await {
            Ok(Ok(reply)) => {
                debug!(model = %self.model, reply = %reply.trim(), "classifier reply");
                ClassifierOutcome::from_reply(&reply)
            }
            Ok(Err(e)) => {
                warn!(model = %self.model, error = %e, "classifier failed");
                ClassifierOutcome::Unavailable
            }
            Err(_) => {
                warn!(model = %self.model, timeout_secs = self.timeout.as_secs_f64(), "classifier timed out");
                ClassifierOutcome::Unavailable
            }
        }
    }
}
