//! Knowledge retrieval boundary.
//!
//! The vector index lives outside this core; it is consumed through the
//! narrow [`Retriever`] interface. [`FakeRetriever`] provides scripted
//! results and records queries for tests.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One ranked candidate passage for a query. Lifetime is bounded to a
/// single orchestration call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub source_id: String,
    pub score: f32,
}

impl RetrievedPassage {
    pub fn new(text: impl Into<String>, source_id: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            score,
        }
    }
}

/// Narrow interface to the retrieval collaborator.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` passages ranked by relevance, best first. Fails
    /// with [`Error::Retrieval`] on backend failure.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>>;
}

// ============================================================================
// Fake Retriever (Testing)
// ============================================================================

#[derive(Debug, Clone)]
enum FakeResult {
    Passages(Vec<RetrievedPassage>),
    Failure(String),
}

/// Scripted retriever for deterministic tests. Records every query so
/// tests can assert invocation counts (including zero).
pub struct FakeRetriever {
    script: Mutex<VecDeque<FakeResult>>,
    fallback: FakeResult,
    queries: Mutex<Vec<String>>,
}

impl FakeRetriever {
    /// Fake returning no passages once the script runs out.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: FakeResult::Passages(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Fake whose every unscripted call yields these passages.
    pub fn with_passages(passages: Vec<RetrievedPassage>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: FakeResult::Passages(passages),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Fake whose every unscripted call fails.
    pub fn failing(message: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: FakeResult::Failure(message.to_string()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn push_passages(&self, passages: Vec<RetrievedPassage>) {
        self.script
            .lock()
            .unwrap()
            .push_back(FakeResult::Passages(passages));
    }

    pub fn push_failure(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(FakeResult::Failure(message.to_string()));
    }

    /// Queries seen so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

impl Default for FakeRetriever {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        self.queries.lock().unwrap().push(query.to_string());

        let result = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match result {
            FakeResult::Passages(mut passages) => {
                passages.truncate(k);
                Ok(passages)
            }
            FakeResult::Failure(message) => Err(Error::Retrieval(message)),
        }
    }
}
