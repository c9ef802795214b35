//! Prometheus metrics (spec §6 `GET /metrics`): a `Registry` of counters
//! and histograms, gathered and text-encoded on each scrape, the standard
//! `prometheus` crate pattern for exposing metrics from an axum service.

use prometheus::{HistogramVec, IntCounterVec, Opts, Registry};

/// Counters and histograms the orchestrator and fallback controller update
/// as requests complete. `fallback_index` is carried as a label per spec
/// §4.6 ("emitting `fallback_index` in metrics labels").
pub struct GatewayMetrics {
    pub registry: Registry,
    pub requests_total: IntCounterVec,
    pub errors_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Completed gateway requests"),
            &["provider", "model", "fallback_index"],
        )
        .expect("valid counter opts");
        let errors_total = IntCounterVec::new(
            Opts::new("gateway_errors_total", "Failed gateway requests by error kind"),
            &["kind"],
        )
        .expect("valid counter opts");
        let request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("gateway_request_duration_seconds", "End-to-end request latency"),
            &["provider", "model"],
        )
        .expect("valid histogram opts");

        registry.register(Box::new(requests_total.clone())).expect("register requests_total");
        registry.register(Box::new(errors_total.clone())).expect("register errors_total");
        registry.register(Box::new(request_duration_seconds.clone())).expect("register request_duration_seconds");

        Self { registry, requests_total, errors_total, request_duration_seconds }
    }

    pub fn record_success(&self, provider: &str, model: &str, fallback_index: u32, total_ms: u64) {
        self.requests_total.with_label_values(&[provider, model, &fallback_index.to_string()]).inc();
        self.request_duration_seconds
            .with_label_values(&[provider, model])
            .observe(total_ms as f64 / 1000.0);
    }

    pub fn record_error(&self, kind: gw_core::ErrorKind) {
        self.errors_total.with_label_values(&[&format!("{kind:?}")]).inc();
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
