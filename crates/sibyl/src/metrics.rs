//! Prometheus metrics for the orchestration core.
//!
//! Recording is fire-and-forget: none of these methods can fail or block
//! the caller. The registry is constructed explicitly and shared via
//! `Arc`, one instance per orchestrator (no globals).

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry, Encoder,
    HistogramVec, IntCounterVec, Registry, TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    /// Answered questions by strategy and outcome
    pub questions_total: IntCounterVec,
    /// External call attempts by site and status
    pub call_attempts_total: IntCounterVec,
    /// External call latency by site
    pub call_latency_seconds: HistogramVec,
    /// Cache operations by cache name and result
    pub cache_ops_total: IntCounterVec,
    /// Breaker state transitions by site and target state
    pub breaker_transitions_total: IntCounterVec,

    registry: Arc<Registry>,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let questions_total = register_int_counter_vec_with_registry!(
            "sibyl_questions_total",
            "Total questions answered by strategy and outcome",
            &["strategy", "outcome"],
            registry
        )
        .unwrap();

        let call_attempts_total = register_int_counter_vec_with_registry!(
            "sibyl_call_attempts_total",
            "External call attempts by call site and status",
            &["site", "status"],
            registry
        )
        .unwrap();

        let call_latency_seconds = register_histogram_vec_with_registry!(
            "sibyl_call_latency_seconds",
            "External call latency in seconds by call site",
            &["site"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            registry
        )
        .unwrap();

        let cache_ops_total = register_int_counter_vec_with_registry!(
            "sibyl_cache_ops_total",
            "Cache lookups by cache name and result",
            &["cache", "result"],
            registry
        )
        .unwrap();

        let breaker_transitions_total = register_int_counter_vec_with_registry!(
            "sibyl_breaker_transitions_total",
            "Circuit breaker transitions by call site and target state",
            &["site", "to"],
            registry
        )
        .unwrap();

        Self {
            questions_total,
            call_attempts_total,
            call_latency_seconds,
            cache_ops_total,
            breaker_transitions_total,
            registry: Arc::new(registry),
        }
    }

    pub fn record_question(&self, strategy: &str, outcome: &str) {
        self.questions_total
            .with_label_values(&[strategy, outcome])
            .inc();
    }

    pub fn record_attempt(&self, site: &str, status: &str, latency_secs: f64) {
        self.call_attempts_total
            .with_label_values(&[site, status])
            .inc();
        self.call_latency_seconds
            .with_label_values(&[site])
            .observe(latency_secs);
    }

    pub fn record_cache(&self, cache: &str, result: &str) {
        self.cache_ops_total.with_label_values(&[cache, result]).inc();
    }

    pub fn record_breaker_transition(&self, site: &str, to: &str) {
        self.breaker_transitions_total
            .with_label_values(&[site, to])
            .inc();
    }

    /// Render the registry in Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_appear_in_export() {
        let metrics = Metrics::new();
        metrics.record_question("knowledge", "ok");
        metrics.record_attempt("generate", "success", 0.2);
        metrics.record_cache("route", "hit");
        metrics.record_breaker_transition("retrieve", "open");

        let text = metrics.export();
        assert!(text.contains("sibyl_questions_total"));
        assert!(text.contains("sibyl_call_attempts_total"));
        assert!(text.contains("sibyl_cache_ops_total"));
        assert!(text.contains("sibyl_breaker_transitions_total"));
    }

    #[test]
    fn independent_registries_per_instance() {
        // two instances must not collide on registration
        let a = Metrics::new();
        let b = Metrics::new();
        a.record_question("casual", "ok");
        assert!(!b.export().contains("casual"));
    }
}
