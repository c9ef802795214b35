//! `POST /v1/text/completions` (spec §6): legacy text completion, always
//! non-streaming.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use gw_core::RequestContext;
use gw_mcp::mediator::ToolFilterOverrides;
use serde_json::Value;

use crate::errors::ApiError;
use crate::handlers::virtual_key_from_headers;
use crate::state::AppState;
use crate::wire::{text_request_from_wire, text_response_to_wire, TextCompletionRequest};

pub async fn text_completions(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<TextCompletionRequest>) -> Result<Json<Value>, ApiError> {
    let virtual_key = virtual_key_from_headers(&headers);
    let request = text_request_from_wire(body, virtual_key.clone())?;
    let ctx = RequestContext::new();
    let response = match state.orchestrator.handle_non_stream(ctx.clone(), request, ToolFilterOverrides::default()).await {
        Ok(response) => response,
        Err(err) => {
            state.metrics.record_error(err.kind);
            return Err(err.into());
        }
    };
    state.metrics.record_success(
        &response.common.provider,
        &response.common.model,
        response.common.fallback_index,
        response.common.latency.total_ms,
    );
    state
        .log_store
        .create(crate::log_store::log_from_response(uuid::Uuid::new_v4().to_string(), ctx.request_id(), virtual_key, &response, None))
        .await;
    Ok(Json(text_response_to_wire(ctx.request_id(), &response)))
}
