//! Answer orchestration.
//!
//! Composes router, memory, retriever, and the generation backend into one
//! end-to-end `answer` operation with source attribution and hybrid
//! fallback. Shared state (memory, caches, breakers) is safe under
//! concurrent callers; turns are appended only after a completed exchange,
//! so a failed or cancelled call leaves memory untouched.

use crate::cache::TtlCache;
use crate::config::SibylConfig;
use crate::error::Result;
use crate::llm::{GenerateOptions, LlmClient};
use crate::memory::{ConversationMemory, Turn};
use crate::metrics::Metrics;
use crate::prompts::{build_casual_prompt, build_grounded_prompt, build_knowledge_fallback_prompt};
use crate::resilience::{CallGuard, CircuitState};
use crate::retrieval::{RetrievedPassage, Retriever};
use crate::router::{QuestionRouter, RouteStrategy};
use crate::validation::validate_question;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Final result of one answered question. Immutable.
#[derive(Debug, Clone)]
pub struct AnswerResult {
    pub answer: String,
    /// Whether retrieved passages informed the answer
    pub used_documents: bool,
    /// Deduplicated source ids, in retrieval order
    pub sources: Vec<String>,
    /// The router's intent. Stays `knowledge` even when the hybrid
    /// fallback answered without documents, so callers can tell "tried
    /// documents, none relevant" apart from pure casual chat.
    pub strategy: RouteStrategy,
}

pub struct AnswerOrchestrator {
    memory: Arc<ConversationMemory>,
    router: QuestionRouter,
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LlmClient>,
    retrieval_guard: CallGuard,
    generation_guard: CallGuard,
    retrieval_cache: Option<Arc<TtlCache<String, Vec<RetrievedPassage>>>>,
    metrics: Arc<Metrics>,
    options: GenerateOptions,
    prompt_window_turns: usize,
    retrieval_k: usize,
    relevance_threshold: f32,
}

impl AnswerOrchestrator {
    /// Construct from validated configuration and the two external
    /// collaborators. Fails fast on invalid constants.
    pub fn new(
        config: &SibylConfig,
        llm: Arc<dyn LlmClient>,
        retriever: Arc<dyn Retriever>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        config.validate()?;

        let router = QuestionRouter::new(
            Arc::clone(&llm),
            &config.retry,
            &config.circuit,
            &config.cache,
            Arc::clone(&metrics),
        );

        let retrieval_cache = config.cache.enabled.then(|| {
            Arc::new(TtlCache::new(
                config.cache.max_entries,
                Duration::from_secs(config.cache.ttl_secs),
            ))
        });

        Ok(Self {
            memory: Arc::new(ConversationMemory::new(config.memory.max_turns)),
            router,
            retriever,
            retrieval_guard: CallGuard::from_config(
                "retrieve",
                &config.retry,
                &config.circuit,
                Arc::clone(&metrics),
            ),
            generation_guard: CallGuard::from_config(
                "generate",
                &config.retry,
                &config.circuit,
                Arc::clone(&metrics),
            ),
            llm,
            retrieval_cache,
            metrics,
            options: GenerateOptions {
                temperature: config.llm.temperature,
                max_tokens: None,
            },
            prompt_window_turns: config.memory.prompt_window_turns,
            retrieval_k: config.retrieval.k,
            relevance_threshold: config.retrieval.relevance_threshold,
        })
    }

    /// Answer one question end to end.
    ///
    /// On success the exchange is appended to memory. On failure the
    /// typed error propagates and memory stays untouched; a generation
    /// failure is never converted into an empty success.
    pub async fn answer(&self, question: &str) -> Result<AnswerResult> {
        match self.answer_inner(question).await {
            Ok(result) => {
                self.metrics.record_question(result.strategy.as_str(), "ok");
                Ok(result)
            }
            Err(err) => {
                self.metrics.record_question("none", err.kind());
                Err(err)
            }
        }
    }

    async fn answer_inner(&self, question: &str) -> Result<AnswerResult> {
        let question = validate_question(question)?;

        let window = self.memory.window();
        let start = window.len().saturating_sub(self.prompt_window_turns);
        let prompt_window = &window[start..];

        let decision = self.router.classify(&question, prompt_window).await;
        info!(strategy = decision.strategy.as_str(), "question routed");

        let result = match decision.strategy {
            RouteStrategy::Casual => {
                let prompt = build_casual_prompt(&question, prompt_window);
                let answer = self.generate(&prompt).await?;
                AnswerResult {
                    answer,
                    used_documents: false,
                    sources: Vec::new(),
                    strategy: RouteStrategy::Casual,
                }
            }
            RouteStrategy::Knowledge => {
                let passages = self.retrieve_cached(&question).await?;
                let relevant = passages
                    .iter()
                    .any(|p| p.score >= self.relevance_threshold);

                if passages.is_empty() || !relevant {
                    info!(
                        passages = passages.len(),
                        threshold = self.relevance_threshold,
                        "no relevant passages, hybrid fallback to model knowledge"
                    );
                    let prompt = build_knowledge_fallback_prompt(&question, prompt_window);
                    let answer = self.generate(&prompt).await?;
                    AnswerResult {
                        answer,
                        used_documents: false,
                        sources: Vec::new(),
                        strategy: RouteStrategy::Knowledge,
                    }
                } else {
                    let sources = dedup_sources(&passages);
                    debug!(passages = passages.len(), sources = sources.len(), "answering from documents");
                    let prompt = build_grounded_prompt(&question, prompt_window, &passages);
                    let answer = self.generate(&prompt).await?;
                    AnswerResult {
                        answer,
                        used_documents: true,
                        sources,
                        strategy: RouteStrategy::Knowledge,
                    }
                }
            }
        };

        // completed exchange: commit both turns, in order
        self.memory.append(Turn::user(&question));
        self.memory.append(Turn::assistant(&result.answer));

        Ok(result)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generation_guard
            .run(|| self.llm.generate(prompt, &self.options))
            .await
    }

    async fn retrieve_cached(&self, question: &str) -> Result<Vec<RetrievedPassage>> {
        let key = question.trim().to_lowercase();

        if let Some(cache) = &self.retrieval_cache {
            if let Some(passages) = cache.get(&key).await {
                self.metrics.record_cache("retrieval", "hit");
                return Ok(passages);
            }
            self.metrics.record_cache("retrieval", "miss");
        }

        let k = self.retrieval_k;
        let passages = self
            .retrieval_guard
            .run(|| self.retriever.retrieve(question, k))
            .await?;

        if let Some(cache) = &self.retrieval_cache {
            cache.set(key, passages.clone()).await;
        }
        Ok(passages)
    }

    /// Spawn the periodic sweep for the retrieval cache, when caching is
    /// enabled. The sweep never holds locks across external calls.
    pub fn spawn_cache_sweeper(
        &self,
        interval: Duration,
    ) -> Option<tokio::task::JoinHandle<()>> {
        self.retrieval_cache
            .as_ref()
            .map(|cache| crate::cache::spawn_sweeper(Arc::clone(cache), interval))
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Breaker states for diagnostics: (retrieve, generate).
    pub fn breaker_states(&self) -> (CircuitState, CircuitState) {
        (
            self.retrieval_guard.breaker_state(),
            self.generation_guard.breaker_state(),
        )
    }
}

/// Source ids of the passages, deduplicated, retrieval order preserved.
fn dedup_sources(passages: &[RetrievedPassage]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for passage in passages {
        if !sources.iter().any(|s| s == &passage.source_id) {
            sources.push(passage.source_id.clone());
        }
    }
    sources
}
