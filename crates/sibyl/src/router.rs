//! Question router: decides the answer strategy per question.
//!
//! Delegates the judgment to the generation backend with one short
//! classification prompt that includes the memory window. If the call
//! fails after the resilience budget, the router defaults to `knowledge`:
//! attempting retrieval is safer than silently chatting when documents
//! might be relevant.

use crate::cache::TtlCache;
use crate::config::{CacheConfig, CircuitConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::llm::{GenerateOptions, LlmClient};
use crate::memory::Turn;
use crate::metrics::Metrics;
use crate::prompts::build_classifier_prompt;
use crate::resilience::CallGuard;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Answer strategy chosen for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    /// Small talk, answered without retrieval
    Casual,
    /// Needs specific knowledge, retrieval attempted
    Knowledge,
}

impl RouteStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStrategy::Casual => "casual",
            RouteStrategy::Knowledge => "knowledge",
        }
    }
}

impl std::fmt::Display for RouteStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one classification. Consumed immediately by the
/// orchestrator, not stored beyond the route cache.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub strategy: RouteStrategy,
    /// Raw classifier output, kept for logs and diagnostics
    pub rationale: Option<String>,
}

impl RouteDecision {
    fn fallback(reason: &str) -> Self {
        Self {
            strategy: RouteStrategy::Knowledge,
            rationale: Some(format!("fallback: {}", reason)),
        }
    }
}

/// Map the raw classifier output to a strategy. Mirrors the permissive
/// matching of the classifier contract: anything that does not clearly
/// say casual is treated as a knowledge question.
pub fn parse_route_label(raw: &str) -> RouteStrategy {
    if raw.to_lowercase().contains("casual") {
        RouteStrategy::Casual
    } else {
        RouteStrategy::Knowledge
    }
}

pub struct QuestionRouter {
    llm: Arc<dyn LlmClient>,
    guard: CallGuard,
    cache: Option<TtlCache<String, RouteDecision>>,
    metrics: Arc<Metrics>,
}

impl QuestionRouter {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        retry: &RetryConfig,
        circuit: &CircuitConfig,
        cache: &CacheConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let guard = CallGuard::from_config("classify", retry, circuit, Arc::clone(&metrics));
        let cache = cache.enabled.then(|| {
            TtlCache::new(cache.max_entries, Duration::from_secs(cache.ttl_secs))
        });
        Self {
            llm,
            guard,
            cache,
            metrics,
        }
    }

    /// Classify `question` against the memory window. Never fails: a
    /// broken classifier degrades to the conservative `knowledge` route.
    pub async fn classify(&self, question: &str, window: &[Turn]) -> RouteDecision {
        let key = cache_key(question, window);

        if let Some(cache) = &self.cache {
            if let Some(decision) = cache.get(&key).await {
                self.metrics.record_cache("route", "hit");
                debug!(strategy = decision.strategy.as_str(), "route cache hit");
                return decision;
            }
            self.metrics.record_cache("route", "miss");
        }

        let decision = match self.classify_uncached(question, window).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(error = %err, "classification failed, defaulting to knowledge route");
                return RouteDecision::fallback(&err.to_string());
            }
        };

        if let Some(cache) = &self.cache {
            cache.set(key, decision.clone()).await;
        }
        decision
    }

    async fn classify_uncached(&self, question: &str, window: &[Turn]) -> Result<RouteDecision> {
        let prompt = build_classifier_prompt(question, window);
        // deterministic, tiny completion: just the label
        let options = GenerateOptions {
            temperature: 0.0,
            max_tokens: Some(8),
        };

        // backend failures at this site are classification failures, not
        // answer-generation failures
        let raw = self
            .guard
            .run(|| async {
                self.llm
                    .generate(&prompt, &options)
                    .await
                    .map_err(|err| match err {
                        Error::Generation(message) => Error::Classification(message),
                        other => other,
                    })
            })
            .await?;

        let strategy = parse_route_label(&raw);
        debug!(strategy = strategy.as_str(), raw = raw.trim(), "question classified");
        Ok(RouteDecision {
            strategy,
            rationale: Some(raw.trim().to_string()),
        })
    }
}

/// Normalization of (question, window) used as the route cache key.
pub fn cache_key(question: &str, window: &[Turn]) -> String {
    let mut key = question.trim().to_lowercase();
    for turn in window {
        key.push('\u{1f}');
        key.push_str(turn.role.as_str());
        key.push(':');
        key.push_str(turn.text.trim());
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, CircuitConfig, RetryConfig};
    use crate::llm::FakeLlmClient;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter: false,
            attempt_timeout_secs: 5,
        }
    }

    fn router_with(llm: Arc<FakeLlmClient>) -> QuestionRouter {
        QuestionRouter::new(
            llm,
            &fast_retry(),
            &CircuitConfig::default(),
            &CacheConfig::default(),
            Arc::new(Metrics::new()),
        )
    }

    #[test]
    fn label_parsing_is_permissive() {
        assert_eq!(parse_route_label("casual"), RouteStrategy::Casual);
        assert_eq!(parse_route_label(" Casual\n"), RouteStrategy::Casual);
        assert_eq!(parse_route_label("This is casual chat"), RouteStrategy::Casual);
        assert_eq!(parse_route_label("knowledge"), RouteStrategy::Knowledge);
        assert_eq!(parse_route_label("gibberish"), RouteStrategy::Knowledge);
        assert_eq!(parse_route_label(""), RouteStrategy::Knowledge);
    }

    #[test]
    fn cache_key_includes_window() {
        let bare = cache_key("How does it work?", &[]);
        let with_context = cache_key(
            "How does it work?",
            &[Turn::user("Tell me about agent memory")],
        );
        assert_ne!(bare, with_context);
        // same question, normalized
        assert_eq!(cache_key("  HELLO ", &[]), cache_key("hello", &[]));
    }

    #[tokio::test]
    async fn classifies_casual() {
        let llm = Arc::new(FakeLlmClient::new());
        llm.push_response("casual");
        let router = router_with(Arc::clone(&llm));

        let decision = router.classify("Hello, how are you?", &[]).await;
        assert_eq!(decision.strategy, RouteStrategy::Casual);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn repeated_question_is_served_from_cache() {
        let llm = Arc::new(FakeLlmClient::new());
        llm.push_response("knowledge");
        let router = router_with(Arc::clone(&llm));

        let first = router.classify("What is agent memory?", &[]).await;
        let second = router.classify("What is agent memory?", &[]).await;
        assert_eq!(first.strategy, RouteStrategy::Knowledge);
        assert_eq!(second.strategy, RouteStrategy::Knowledge);
        // only one classifier call went out
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn classifier_failure_defaults_to_knowledge() {
        let llm = Arc::new(FakeLlmClient::failing("model offline"));
        let router = router_with(Arc::clone(&llm));

        let decision = router.classify("What is agent memory?", &[]).await;
        assert_eq!(decision.strategy, RouteStrategy::Knowledge);
        // retried per the resilience budget before falling back
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn classifier_failure_is_reported_as_classification() {
        let llm = Arc::new(FakeLlmClient::failing("model offline"));
        let router = router_with(Arc::clone(&llm));

        let decision = router.classify("What is agent memory?", &[]).await;
        assert_eq!(decision.strategy, RouteStrategy::Knowledge);
        // the fallback rationale carries the classification error, not a
        // generation error
        let rationale = decision.rationale.unwrap();
        assert!(rationale.contains("classification failed"));
        assert!(!rationale.contains("generation failed"));
    }

    #[tokio::test]
    async fn failed_classification_is_not_cached() {
        let llm = Arc::new(FakeLlmClient::new());
        llm.push_failure("blip");
        llm.push_failure("blip");
        llm.push_response("casual");
        let router = router_with(Arc::clone(&llm));

        let first = router.classify("Hello there friend", &[]).await;
        assert_eq!(first.strategy, RouteStrategy::Knowledge);

        // next ask re-runs the classifier instead of reusing the fallback
        let second = router.classify("Hello there friend", &[]).await;
        assert_eq!(second.strategy, RouteStrategy::Casual);
    }
}
