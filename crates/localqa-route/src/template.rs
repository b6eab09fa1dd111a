//! Per-model prompt templates.

use serde::Serialize;

use crate::fuzzy::base_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Code only: no prose, no markdown fences.
    Code,
    Concise,
    /// Numbered reasoning, then the answer.
    StepByStep,
}

const CODE_MODELS: &[&str] = &["codellama", "deepseek-coder", "qwen2.5-coder", "starcoder2"];
const CONCISE_MODELS: &[&str] = &["llama3", "mistral", "gemma"];
const STEP_MODELS: &[&str] = &["phi", "phi3"];

/// Template for `model` by base name; `None` for unmapped models.
pub fn template_for(model: &str) -> Option<Template> {
    let base = base_name(model).to_ascii_lowercase();
    let base = base.as_str();
    if CODE_MODELS.contains(&base) {
        Some(Template::Code)
    } else if CONCISE_MODELS.contains(&base) {
        Some(Template::Concise)
    } else if STEP_MODELS.contains(&base) {
        Some(Template::StepByStep)
    } else {
        None
    }
}

impl Template {
    pub fn render(self, prompt: &str) -> String {
        match self {
            Template::Code => format!(
                "You are a coding assistant. Respond with code only: no explanations, no prose, \
                 and no markdown code fences (never write ```). If the request does not name a \
                 programming language, choose the single most likely language and use only that.\n\n\
                 Task: {prompt}"
            ),
            Template::Concise => format!("Answer directly and concisely.\n\n{prompt}"),
            Template::StepByStep => format!(
                "Work through the following step by step. Number each reasoning step, then give \
                 the final answer on its own line starting with \"Answer:\".\n\n{prompt}"
            ),
        }
    }
}

/// Wrap `prompt` in the template for `model`, or pass it through verbatim.
pub fn render_for_model(model: &str, prompt: &str) -> String {
    match template_for(model) {
        Some(t) => t.render(prompt),
        None => prompt.to_string(),
    }
}
