//! `GET /metrics` (spec §6): Prometheus exposition.

use axum::extract::State;
use axum::response::IntoResponse;
use prometheus::{Encoder, TextEncoder};

use crate::state::AppState;

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    ([("content-type", encoder.format_type().to_string())], buffer)
}
