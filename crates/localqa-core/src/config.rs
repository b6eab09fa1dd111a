//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (`__` separates nested keys, so
//! `APP_ENGINE__BASE_URL` sets `engine.base_url`). Provides helpers to expand
//! `~` and `${VAR}` and to resolve relative paths against a known base
//! directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::DomainLabel;

pub const CHUNK_SIZE: usize = 500;
pub const CHUNK_OVERLAP: usize = 100;
pub const DEFAULT_TOP_K: usize = 4;
pub const CLASSIFY_TIMEOUT_SECS: u64 = 30;
pub const PULL_TIMEOUT_SECS: u64 = 300;
pub const LIST_TIMEOUT_SECS: u64 = 10;
pub const FUZZY_CUTOFF: f64 = 0.6;

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    /// Load `config.toml` and `config.<env>.toml` from `dir`.
    pub fn load_from(dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name: env_name.to_string() };
        config.settings()?;
        Ok(config)
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Extract and validate the full typed settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate_for_env(&self.env_name)?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub embedding: EmbeddingSettings,
    pub routing: RoutingSettings,
    pub models: ModelSettings,
    pub data: DataSettings,
    pub retrieval: RetrievalSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    /// Ollama REST API.
    Http,
    /// `ollama` subprocesses.
    Cli,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub backend: EngineBackend,
    pub base_url: String,
    pub binary: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            backend: EngineBackend::Http,
            base_url: "http://127.0.0.1:11434".to_string(),
            binary: "ollama".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Ollama,
    Fake,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model: String,
    /// Defaults to `engine.base_url` when empty.
    pub base_url: String,
    pub dimension: usize,
    /// Directory holding BGE-M3 weights for the `local` backend.
    pub model_dir: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            model: "nomic-embed-text".to_string(),
            base_url: String::new(),
            dimension: 768,
            model_dir: "models/bge-m3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    pub classifier_model: String,
    pub classify_timeout_secs: u64,
    pub default_model: String,
    pub fuzzy_cutoff: f64,
    /// Domain label (`legal`, `code`, ...) to model name.
    pub domain_models: BTreeMap<String, String>,
    pub code_keywords: Vec<String>,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        let domain_models = [
            ("legal", "mistral"),
            ("science", "phi"),
            ("insurance", "mistral"),
            ("math", "phi"),
            ("code", "codellama"),
            ("general", "llama3"),
        ]
        .into_iter()
        .map(|(d, m)| (d.to_string(), m.to_string()))
        .collect();
        let code_keywords = [
            "code", "coding", "function", "method", "class", "script", "program", "compile",
            "compiler", "debug", "bug", "python", "javascript", "typescript", "java", "rust",
            "golang", "c++", "sql", "regex", "api", "algorithm", "snippet",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        Self {
            classifier_model: "llama3".to_string(),
            classify_timeout_secs: CLASSIFY_TIMEOUT_SECS,
            default_model: "llama3".to_string(),
            fuzzy_cutoff: FUZZY_CUTOFF,
            domain_models,
            code_keywords,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Baseline models; empty means "every routed model plus the classifier".
    pub required: Vec<String>,
    pub pull_timeout_secs: u64,
    pub list_timeout_secs: u64,
    pub pull_on_start: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            required: Vec::new(),
            pull_timeout_secs: PULL_TIMEOUT_SECS,
            list_timeout_secs: LIST_TIMEOUT_SECS,
            pull_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub upload_dir: String,
    pub index_path: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { upload_dir: "uploads".to_string(), index_path: "rag_store/index.json".to_string() }
    }
}

impl DataSettings {
    pub fn upload_dir_path(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.upload_dir)
    }

    pub fn index_file_path(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.index_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: DEFAULT_TOP_K, chunk_size: CHUNK_SIZE, chunk_overlap: CHUNK_OVERLAP }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Append logs to this file instead of stderr.
    pub file: Option<String>,
}

impl Settings {
    pub fn validate_for_env(&self, env: &str) -> Result<()> {
        let r = &self.retrieval;
        if r.chunk_size == 0 || r.chunk_overlap >= r.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                r.chunk_overlap, r.chunk_size
            )));
        }
        if r.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.routing.fuzzy_cutoff) {
            return Err(Error::InvalidConfig(format!(
                "routing.fuzzy_cutoff must be within [0, 1], got {}",
                self.routing.fuzzy_cutoff
            )));
        }
        for domain in DomainLabel::ALL {
            if !self.routing.domain_models.contains_key(domain.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "routing.domain_models has no model for domain '{domain}'"
                )));
            }
        }
        for key in self.routing.domain_models.keys() {
            key.parse::<DomainLabel>().map_err(Error::InvalidConfig)?;
        }
        match env {
            "prod" | "production" => {
                if self.embedding.backend == EmbeddingBackend::Fake {
                    return Err(Error::InvalidConfig(
                        "the fake embedding backend is not allowed in production".into(),
                    ));
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }

    /// Models the registry should make sure are installed.
    pub fn required_models(&self) -> Vec<String> {
        if !self.models.required.is_empty() {
            return self.models.required.clone();
        }
        let mut models: Vec<String> = self.routing.domain_models.values().cloned().collect();
        models.push(self.routing.classifier_model.clone());
        models.sort();
        models.dedup();
        models
    }

    pub fn embedding_base_url(&self) -> &str {
        if self.embedding.base_url.is_empty() {
            &self.engine.base_url
        } else {
            &self.embedding.base_url
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
