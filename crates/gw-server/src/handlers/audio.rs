//! `POST /v1/audio/speech` and `POST /v1/audio/transcriptions` (spec §6).

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use gw_core::{GatewayError, RequestContext, ResponsePayload};
use gw_mcp::mediator::ToolFilterOverrides;

use crate::errors::ApiError;
use crate::handlers::virtual_key_from_headers;
use crate::state::AppState;
use crate::wire::{speech_request_from_wire, transcription_request_from_wire, transcription_response_to_wire, SpeechRequest, TranscriptionFields};

/// Returns binary audio by default; an SSE variant would stream base64
/// chunks the same way [`crate::sse`] frames chat deltas, but no adapter in
/// this gateway currently emits streamed speech chunks (spec §9: every
/// built-in speech adapter call is non-streaming), so only the binary path
/// is implemented.
pub async fn speech(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<SpeechRequest>) -> Result<AxumResponse, ApiError> {
    let virtual_key = virtual_key_from_headers(&headers);
    let request = speech_request_from_wire(body, virtual_key.clone())?;
    let ctx = RequestContext::new();
    let response = match state.orchestrator.handle_non_stream(ctx.clone(), request, ToolFilterOverrides::default()).await {
        Ok(response) => response,
        Err(err) => {
            state.metrics.record_error(err.kind);
            return Err(err.into());
        }
    };
    state.metrics.record_success(&response.common.provider, &response.common.model, response.common.fallback_index, response.common.latency.total_ms);
    state
        .log_store
        .create(crate::log_store::log_from_response(uuid::Uuid::new_v4().to_string(), ctx.request_id(), virtual_key, &response, None))
        .await;

    let ResponsePayload::Speech { audio_base64 } = &response.payload else {
        return Err(ApiError(GatewayError::internal("speech adapter returned a non-speech payload")));
    };
    let bytes = BASE64
        .decode(audio_base64)
        .map_err(|e| ApiError(GatewayError::internal(format!("invalid base64 audio payload: {e}"))))?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response())
}

pub async fn transcriptions(State(state): State<AppState>, headers: HeaderMap, mut multipart: Multipart) -> Result<AxumResponse, ApiError> {
    let virtual_key = virtual_key_from_headers(&headers);
    let mut model = None;
    let mut audio_bytes = None;
    let mut format = None;
    let mut response_format = "json".to_string();

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError(GatewayError::validation(e.to_string())))? {
        match field.name().unwrap_or_default() {
            "model" => model = Some(field.text().await.map_err(|e| ApiError(GatewayError::validation(e.to_string())))?),
            "response_format" => response_format = field.text().await.map_err(|e| ApiError(GatewayError::validation(e.to_string())))?,
            "file" => {
                format = field.file_name().and_then(|n| n.rsplit('.').next()).map(str::to_string);
                let data = field.bytes().await.map_err(|e| ApiError(GatewayError::validation(e.to_string())))?;
                audio_bytes = Some(data.to_vec());
            }
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    let model = model.ok_or_else(|| ApiError(GatewayError::validation("missing \"model\" field")))?;
    let audio_bytes = audio_bytes.ok_or_else(|| ApiError(GatewayError::validation("missing \"file\" field")))?;

    let request = transcription_request_from_wire(
        TranscriptionFields {
            model,
            audio_base64: BASE64.encode(audio_bytes),
            format,
        },
        virtual_key.clone(),
    )?;

    let ctx = RequestContext::new();
    let response = match state.orchestrator.handle_non_stream(ctx.clone(), request, ToolFilterOverrides::default()).await {
        Ok(response) => response,
        Err(err) => {
            state.metrics.record_error(err.kind);
            return Err(err.into());
        }
    };
    state.metrics.record_success(&response.common.provider, &response.common.model, response.common.fallback_index, response.common.latency.total_ms);
    state
        .log_store
        .create(crate::log_store::log_from_response(uuid::Uuid::new_v4().to_string(), ctx.request_id(), virtual_key, &response, None))
        .await;

    match response_format.as_str() {
        "text" => {
            let ResponsePayload::Transcription { text } = &response.payload else {
                return Err(ApiError(GatewayError::internal("transcription adapter returned a non-transcription payload")));
            };
            Ok((StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], text.clone()).into_response())
        }
        "srt" | "vtt" => {
            let ResponsePayload::Transcription { text } = &response.payload else {
                return Err(ApiError(GatewayError::internal("transcription adapter returned a non-transcription payload")));
            };
            let body = render_caption_track(text, response_format.as_str());
            Ok((StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], body).into_response())
        }
        "verbose_json" => Ok(Json(transcription_response_to_wire(&response)).into_response()),
        _ => Ok(Json(transcription_response_to_wire(&response)).into_response()),
    }
}

/// A single-cue caption track covering the whole transcript: adapters in
/// this gateway do not return word/segment timing, so there is only ever
/// one cue to emit.
fn render_caption_track(text: &str, format: &str) -> String {
    if format == "vtt" {
        format!("WEBVTT\n\n00:00:00.000 --> 00:00:00.000\n{text}\n")
    } else {
        format!("1\n00:00:00,000 --> 00:00:00,000\n{text}\n")
    }
}
