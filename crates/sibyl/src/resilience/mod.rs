//! Resilience wrapper for fallible external calls.
//!
//! A [`CallGuard`] composes a retry schedule, a circuit breaker, and a
//! per-attempt timeout around one call site. Every attempt emits a metric.
//! Worst-case latency is bounded by `sum over attempts of (timeout +
//! backoff)` before a hard failure surfaces.
//!
//! Cancellation is drop-based: dropping the `run` future aborts the
//! in-flight attempt, and breaker/cache bookkeeping only happens once an
//! attempt has resolved.

pub mod circuit;
pub mod retry;

pub use circuit::{CircuitBreaker, CircuitState};
pub use retry::RetryPolicy;

use crate::config::{CircuitConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Retry + circuit breaker + timeout guard for one external call site.
pub struct CallGuard {
    site: &'static str,
    retry: RetryPolicy,
    breaker: Mutex<CircuitBreaker>,
    attempt_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl CallGuard {
    pub fn new(
        site: &'static str,
        retry: RetryPolicy,
        breaker: CircuitBreaker,
        attempt_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            site,
            retry,
            breaker: Mutex::new(breaker),
            attempt_timeout,
            metrics,
        }
    }

    pub fn from_config(
        site: &'static str,
        retry: &RetryConfig,
        circuit: &CircuitConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::new(
            site,
            RetryPolicy::from_config(retry),
            CircuitBreaker::from_config(circuit),
            Duration::from_secs(retry.attempt_timeout_secs),
            metrics,
        )
    }

    pub fn site(&self) -> &'static str {
        self.site
    }

    /// Current breaker state for this call site.
    pub fn breaker_state(&self) -> CircuitState {
        self.lock_breaker().state()
    }

    /// Run `op` under retry, breaker, and timeout protection.
    ///
    /// Transient errors are retried with exponential backoff until the
    /// attempt budget runs out; non-transient errors propagate at once. An
    /// open breaker rejects without invoking `op` at all.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error: Option<Error> = None;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let delay = self.retry.delay_for(attempt - 1);
                debug!(site = self.site, attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");
                tokio::time::sleep(delay).await;
            }

            if !self.transition(|breaker| breaker.acquire()) {
                self.metrics.record_attempt(self.site, "rejected", 0.0);
                warn!(site = self.site, "circuit open, rejecting call");
                return Err(Error::CircuitOpen { site: self.site });
            }

            let started = Instant::now();
            let outcome = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    site: self.site,
                    timeout_ms: self.attempt_timeout.as_millis() as u64,
                }),
            };
            let elapsed = started.elapsed().as_secs_f64();

            match outcome {
                Ok(value) => {
                    self.on_success();
                    self.metrics.record_attempt(self.site, "success", elapsed);
                    if attempt > 0 {
                        debug!(site = self.site, attempt = attempt + 1, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() => {
                    self.on_failure();
                    self.metrics.record_attempt(self.site, "failure", elapsed);
                    warn!(
                        site = self.site,
                        attempt = attempt + 1,
                        max_attempts = self.retry.max_attempts,
                        error = %err,
                        "transient failure"
                    );
                    last_error = Some(err);
                }
                Err(err) => {
                    // invalid input and similar: not the dependency's
                    // fault, no breaker penalty, no retry
                    self.metrics.record_attempt(self.site, "invalid", elapsed);
                    return Err(err);
                }
            }
        }

        let last = last_error
            .unwrap_or_else(|| Error::Configuration("retry policy allowed no attempts".into()));
        Err(Error::RetryExhausted {
            site: self.site,
            attempts: self.retry.max_attempts,
            last: Box::new(last),
        })
    }

    fn on_success(&self) {
        self.transition(|breaker| breaker.record_success());
    }

    fn on_failure(&self) {
        self.transition(|breaker| breaker.record_failure());
    }

    /// Apply `f` to the breaker and emit a metric if the state changed.
    /// Covers the success/failure paths and the cooldown-elapsed move to
    /// half-open inside `acquire`.
    fn transition<R>(&self, f: impl FnOnce(&mut CircuitBreaker) -> R) -> R {
        let (before, after, out) = {
            let mut breaker = self.lock_breaker();
            let before = breaker.state();
            let out = f(&mut breaker);
            (before, breaker.state(), out)
        };
        if before != after {
            warn!(site = self.site, from = before.as_str(), to = after.as_str(), "breaker transition");
            self.metrics.record_breaker_transition(self.site, after.as_str());
        }
        out
    }

    fn lock_breaker(&self) -> std::sync::MutexGuard<'_, CircuitBreaker> {
        // breaker mutations are short and never panic mid-update, so a
        // poisoned lock still holds consistent state
        self.breaker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn guard(max_attempts: u32, threshold: u32, open_ms: u64) -> CallGuard {
        CallGuard::new(
            "test_site",
            RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5)),
            CircuitBreaker::new(threshold, Duration::from_millis(open_ms)),
            Duration::from_millis(200),
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test]
    async fn returns_first_success() {
        let guard = guard(3, 5, 1000);
        let calls = AtomicU32::new(0);

        let result = guard
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Error>(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_failure_consumes_exact_attempt_budget() {
        let guard = guard(3, 10, 1000);
        let calls = AtomicU32::new(0);

        let result: Result<()> = guard
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Generation("still down".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::RetryExhausted { site, attempts, .. }) => {
                assert_eq!(site, "test_site");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let guard = guard(3, 10, 1000);
        let calls = AtomicU32::new(0);

        let result: Result<()> = guard
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Validation("bad input".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn open_breaker_rejects_without_invoking() {
        let guard = guard(1, 2, 60_000);
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let _: Result<()> = guard
                .run(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(Error::Retrieval("down".into())) }
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(guard.breaker_state(), CircuitState::Open);

        let result: Result<()> = guard
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(Error::CircuitOpen { site: "test_site" })));
        // the wrapped operation was never invoked
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn half_open_probe_success_closes_breaker() {
        let guard = guard(1, 1, 20);

        let _: Result<()> = guard
            .run(|| async { Err(Error::Generation("down".into())) })
            .await;
        assert_eq!(guard.breaker_state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;

        let result = guard.run(|| async { Ok::<_, Error>("recovered") }).await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(guard.breaker_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn cancelled_trial_call_does_not_wedge_the_breaker() {
        let guard = guard(1, 1, 20);

        let _: Result<()> = guard
            .run(|| async { Err(Error::Generation("down".into())) })
            .await;
        assert_eq!(guard.breaker_state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;

        // the half-open trial is dropped mid-flight, so neither success
        // nor failure is ever recorded for it
        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            guard.run(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, Error>(())
            }),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(guard.breaker_state(), CircuitState::HalfOpen);

        tokio::time::sleep(Duration::from_millis(40)).await;

        // the abandoned probe is reclaimed and the site recovers
        let result = guard.run(|| async { Ok::<_, Error>("recovered") }).await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(guard.breaker_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn every_breaker_transition_is_recorded() {
        let metrics = Arc::new(Metrics::new());
        let guard = CallGuard::new(
            "test_site",
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(5)),
            CircuitBreaker::new(1, Duration::from_millis(10)),
            Duration::from_millis(200),
            Arc::clone(&metrics),
        );

        let _: Result<()> = guard
            .run(|| async { Err(Error::Generation("down".into())) })
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = guard.run(|| async { Ok::<_, Error>(()) }).await;

        // open (failure), half_open (cooldown elapsed in acquire), closed
        // (probe success) all show up in the counter
        let text = metrics.export();
        assert!(text.contains(r#"to="open""#));
        assert!(text.contains(r#"to="half_open""#));
        assert!(text.contains(r#"to="closed""#));
    }

    #[tokio::test]
    async fn attempt_timeout_counts_as_transient_failure() {
        let guard = CallGuard::new(
            "slow_site",
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
            CircuitBreaker::new(10, Duration::from_secs(60)),
            Duration::from_millis(20),
            Arc::new(Metrics::new()),
        );

        let result: Result<()> = guard
            .run(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(Error::RetryExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, Error::Timeout { .. }));
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }
}
