use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use localqa_core::config::{RoutingSettings, Settings};
use localqa_core::types::{DomainLabel, Query};
use localqa_engine::{EngineError, FragmentStream, GenerationEngine, ProgressStream, PullProgress};
use localqa_route::{
    render_for_model, template_for, Classifier, ModelMatch, ModelRegistry, RouteReason, Router,
};

/// Replies to every `generate` with a fixed script and records calls.
struct ScriptedEngine {
    reply: Result<String, String>,
    delay: Duration,
    installed: Vec<String>,
    pull_fails: Vec<String>,
    generate_calls: AtomicUsize,
    pulls: parking_lot::Mutex<Vec<String>>,
}

impl ScriptedEngine {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            delay: Duration::ZERO,
            installed: Vec::new(),
            pull_fails: Vec::new(),
            generate_calls: AtomicUsize::new(0),
            pulls: parking_lot::Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self { reply: Err("connection refused".into()), ..Self::replying("") }
    }
}

#[async_trait]
impl GenerationEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _model: &str, _prompt: &str) -> localqa_engine::Result<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.reply.clone().map_err(EngineError::RequestFailed)
    }

    async fn generate_stream(&self, model: &str, prompt: &str) -> localqa_engine::Result<FragmentStream> {
        let text = self.generate(model, prompt).await?;
        Ok(Box::pin(stream::iter(vec![Ok(text)])))
    }

    async fn list_installed(&self) -> localqa_engine::Result<Vec<String>> {
        Ok(self.installed.clone())
    }

    async fn pull(&self, model: &str) -> localqa_engine::Result<ProgressStream> {
        self.pulls.lock().push(model.to_string());
        if self.pull_fails.iter().any(|m| m == model) {
            return Err(EngineError::ModelNotFound(model.to_string()));
        }
        let events = vec![
            Ok(PullProgress::status("pulling manifest")),
            Ok(PullProgress { status: "downloading".into(), total: Some(10), completed: Some(10) }),
            Ok(PullProgress::status("success")),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

fn router_with(engine: Arc<ScriptedEngine>, timeout: Duration) -> Router {
    let routing = RoutingSettings::default();
    Router::new(Classifier::new(engine, routing.classifier_model.clone(), timeout), &routing)
}

fn available(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn unparsable_reply_for_tort_question_routes_to_llama3() {
    let engine = Arc::new(ScriptedEngine::replying("I think this one concerns the law of civil wrongs."));
    let router = router_with(engine, Duration::from_secs(30));
    let decision = router
        .route(&Query::auto("What is tort law?"), &available(&["llama3:latest", "mistral:latest", "phi:latest"]))
        .await;
    assert_eq!(decision.domain, Some(DomainLabel::General));
    assert_eq!(decision.model, "llama3:latest");
    assert_eq!(decision.matched, Some(ModelMatch::BaseName));
}

#[tokio::test]
async fn code_keyword_overrides_and_skips_classifier() {
    let engine = Arc::new(ScriptedEngine::replying("{\"domain\": \"legal\"}"));
    let router = router_with(engine.clone(), Duration::from_secs(30));
    let decision = router
        .route(&Query::auto("write a function to reverse a string"), &available(&["codellama", "llama3"]))
        .await;
    assert_eq!(decision.domain, Some(DomainLabel::Code));
    assert_eq!(decision.reason, RouteReason::KeywordOverride);
    assert_eq!(decision.model, "codellama");
    assert_eq!(engine.generate_calls.load(Ordering::SeqCst), 0);

    let prompt = render_for_model(&decision.model, "write a function to reverse a string");
    assert!(prompt.contains("no markdown code fences"));
}

#[tokio::test]
async fn code_keyword_wins_for_any_classifier_output() {
    for reply in ["{\"domain\": \"math\"}", "science!", "", "{\"domain\": \"general\"}"] {
        let router = router_with(Arc::new(ScriptedEngine::replying(reply)), Duration::from_secs(30));
        let (domain, _) = router.detect_domain("Why does my Python script crash?").await;
        assert_eq!(domain, DomainLabel::Code, "classifier reply {reply:?}");
    }
}

#[tokio::test]
async fn replies_outside_allowed_set_resolve_to_general() {
    for reply in ["{\"domain\": \"astrology\"}", "{\"domain\": \"\"}", "no idea", "{\"domain\": null}"] {
        let router = router_with(Arc::new(ScriptedEngine::replying(reply)), Duration::from_secs(30));
        let (domain, reason) = router.detect_domain("What is the meaning of life?").await;
        assert_eq!(domain, DomainLabel::General, "classifier reply {reply:?}");
        assert_eq!(reason, RouteReason::Classified);
    }
}

#[tokio::test]
async fn parsed_domain_picks_table_model() {
    let router = router_with(Arc::new(ScriptedEngine::replying("{\"domain\": \"insurance\"}")), Duration::from_secs(30));
    let decision = router.route(&Query::auto("Does my policy cover floods?"), &available(&["mistral:7b"])).await;
    assert_eq!(decision.domain, Some(DomainLabel::Insurance));
    assert_eq!(decision.model, "mistral:7b");
}

#[tokio::test]
async fn classifier_failure_and_timeout_fall_back_to_general() {
    let router = router_with(Arc::new(ScriptedEngine::failing()), Duration::from_secs(30));
    assert_eq!(router.detect_domain("What is entropy?").await.0, DomainLabel::General);

    let slow = ScriptedEngine { delay: Duration::from_secs(5), ..ScriptedEngine::replying("{\"domain\": \"science\"}") };
    let router = router_with(Arc::new(slow), Duration::from_millis(50));
    assert_eq!(router.detect_domain("What is entropy?").await.0, DomainLabel::General);
}

#[tokio::test]
async fn explicit_model_passes_through_without_classification() {
    let engine = Arc::new(ScriptedEngine::replying("{\"domain\": \"math\"}"));
    let router = router_with(engine.clone(), Duration::from_secs(30));
    let decision = router.route(&Query::new("2+2?", "not-installed:13b", false), &[]).await;
    assert_eq!(decision.model, "not-installed:13b");
    assert_eq!(decision.reason, RouteReason::Explicit);
    assert_eq!(decision.domain, None);
    assert_eq!(engine.generate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unmatched_model_uses_default() {
    let router = router_with(Arc::new(ScriptedEngine::replying("{\"domain\": \"math\"}")), Duration::from_secs(30));
    let decision = router.route(&Query::auto("integrate x^2"), &available(&["gemma:2b"])).await;
    assert_eq!(decision.model, "llama3");
    assert_eq!(decision.matched, Some(ModelMatch::Default));

    let decision = router.route(&Query::auto("integrate x^2"), &[]).await;
    assert_eq!(decision.model, "llama3");
}

#[test]
fn every_routed_model_has_a_template() {
    let routing = RoutingSettings::default();
    for model in routing.domain_models.values() {
        assert!(template_for(model).is_some(), "{model} has no template");
    }
    let router = router_with(Arc::new(ScriptedEngine::replying("")), Duration::from_secs(1));
    assert!(router.models_without_template().is_empty());
}

#[tokio::test]
async fn ensure_required_pulls_only_missing_and_tolerates_failure() {
    let engine = Arc::new(ScriptedEngine {
        installed: available(&["llama3:latest", "phi:latest"]),
        pull_fails: available(&["codellama"]),
        ..ScriptedEngine::replying("")
    });
    let mut settings = Settings::default();
    settings.models.required = available(&["llama3", "phi", "mistral", "codellama"]);
    let registry = ModelRegistry::from_settings(engine.clone(), &settings);

    let report = registry.ensure_required().await;
    assert_eq!(report.present, vec!["llama3", "phi"]);
    assert_eq!(report.pulled, vec!["mistral"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].model, "codellama");
    assert!(!report.failed[0].success);
    assert_eq!(*engine.pulls.lock(), vec!["mistral", "codellama"]);
    assert!(registry.installed().contains(&"mistral".to_string()));
}

#[tokio::test]
async fn pull_progress_reaches_callback() {
    let engine = Arc::new(ScriptedEngine::replying(""));
    let registry = ModelRegistry::new(engine, Vec::new(), Duration::from_secs(300), Duration::from_secs(10));
    let mut seen = Vec::new();
    let outcome = registry.pull_with_progress("gemma", |p| seen.push(p.status.clone())).await;
    assert!(outcome.success);
    assert_eq!(seen, vec!["pulling manifest", "downloading", "success"]);
}
