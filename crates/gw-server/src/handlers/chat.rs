//! `POST /v1/chat/completions` (spec §6), and the `/openai`, `/anthropic`,
//! `/genai` drop-in-compatible prefixes that route here unchanged since
//! the gateway's wire shape already mirrors OpenAI's.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::Json;
use gw_core::RequestContext;

use crate::errors::ApiError;
use crate::handlers::{cache_headers, tool_filter_overrides, virtual_key_from_headers};
use crate::state::AppState;
use crate::wire::{chat_request_from_wire, chat_response_to_wire, ChatCompletionRequest};

pub async fn chat_completions(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<ChatCompletionRequest>) -> Result<AxumResponse, ApiError> {
    let virtual_key = virtual_key_from_headers(&headers);
    let stream = body.stream;
    let request = chat_request_from_wire(body, virtual_key.clone())?;
    let overrides = tool_filter_overrides(&headers);
    let cache = cache_headers(&headers);

    if !stream {
        if let Some(key) = &cache.key {
            if let Some(cached) = state.cache.get(key) {
                let request_id = uuid::Uuid::new_v4().to_string();
                return Ok(Json(chat_response_to_wire(&request_id, &cached)).into_response());
            }
        }
    }

    let ctx = RequestContext::new();

    if stream {
        let model = request.common.model.clone();
        let handle = match state.orchestrator.clone().handle_stream(ctx.clone(), request, overrides).await {
            Ok(handle) => handle,
            Err(err) => {
                state.metrics.record_error(err.kind);
                return Err(err.into());
            }
        };
        return Ok(crate::sse::chunk_stream_to_sse(ctx.request_id().to_string(), model, handle.chunks).into_response());
    }

    let response = match state.orchestrator.handle_non_stream(ctx.clone(), request, overrides).await {
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
    if let Some(key) = cache.key {
        state.cache.put(key, response.clone(), cache.ttl);
    }
    Ok(Json(chat_response_to_wire(ctx.request_id(), &response)).into_response())
}
