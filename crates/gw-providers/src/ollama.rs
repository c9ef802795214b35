//! Ollama adapter: local inference via Ollama's native `/api/chat` endpoint.
//!
//! Generalized from a single-backend provider that embedded an
//! `ollama_rs::Ollama` client directly. Here the adapter only translates
//! JSON — the worker pool (spec C3) owns the actual HTTP client — so the
//! `ollama-rs` dependency is dropped in favor of talking Ollama's
//! documented wire format directly, the same way every other adapter in
//! this crate does.

use std::collections::HashMap;

use gw_core::chunk::ChunkKind;
use gw_core::response::{LatencyInfo, ResponseCommon, TokenUsage};
use gw_core::{ChunkEvent, GatewayError, Message, NetworkConfig, Request, Response, ResponsePayload};
use serde_json::{json, Value};

use crate::adapter::ProviderAdapter;
use crate::openai::encode_messages;
use crate::vendor_http::{VendorHttpRequest, VendorHttpResponse};

pub struct OllamaAdapter;

impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn encode(&self, request: &Request, _secret: &str, network: &NetworkConfig) -> Result<VendorHttpRequest, GatewayError> {
        let messages = request
            .payload
            .messages()
            .ok_or_else(|| GatewayError::validation("ollama adapter only supports chat-like payloads"))?;

        let mut options = json!({});
        if let Some(t) = request.common.params.temperature {
            options["temperature"] = json!(t);
        }
        if let Some(p) = request.common.params.top_p {
            options["top_p"] = json!(p);
        }
        if let Some(m) = request.common.params.max_tokens {
            options["num_predict"] = json!(m);
        }

        let body = json!({
            "model": request.common.model,
            "messages": encode_messages(messages),
            "stream": request.common.stream,
            "options": options,
        });

        let mut headers = HashMap::new();
        headers.insert("Content-Type".into(), "application/json".into());
        for (k, v) in &network.extra_headers {
            headers.insert(k.clone(), v.clone());
        }

        let base = if network.base_url.is_empty() {
            "http://localhost:11434"
        } else {
            network.base_url.as_str()
        };

        Ok(VendorHttpRequest {
            method: "POST",
            url: format!("{base}/api/chat"),
            headers,
            body,
        })
    }

    fn decode(&self, request: &Request, response: &VendorHttpResponse) -> Result<Response, GatewayError> {
        if response.status >= 400 {
            let retry_after = crate::error_classify::retry_after_from_headers(&response.headers);
            let classified = self.classify_error(response.status, &response.body, retry_after);
            let mut err = GatewayError::new(crate::error_classify::error_kind_for_class(classified.class), classified.message);
            if let Some(secs) = classified.retry_after_secs {
                err = err.retry_after(secs);
            }
            return Err(err);
        }

        let content = response
            .body
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let prompt_tokens = response.body.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0) as u32;
        let completion_tokens = response.body.get("eval_count").and_then(Value::as_u64).unwrap_or(0) as u32;

        Ok(Response {
            common: ResponseCommon {
                provider: "ollama".into(),
                model: request.common.model.clone(),
                usage: TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                },
                latency: LatencyInfo::default(),
                cache: Default::default(),
                raw: None,
                fallback_index: 0,
                number_of_retries: 0,
            },
            payload: ResponsePayload::Chat {
                message: Message::assistant(content),
            },
        })
    }

    fn decode_stream_chunk(
        &self,
        request_id: &str,
        chunk_index: u32,
        monotonic_ms: u64,
        raw_bytes: &[u8],
    ) -> Result<Option<ChunkEvent>, GatewayError> {
        // Ollama's native stream is newline-delimited JSON objects, not SSE.
        let line = std::str::from_utf8(raw_bytes).unwrap_or_default().trim();
        if line.is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| GatewayError::internal(format!("bad ollama stream line json: {e}")))?;

        let done = value.get("done").and_then(Value::as_bool).unwrap_or(false);
        let content = value.get("message").and_then(|m| m.get("content")).and_then(Value::as_str);

        if done {
            let mut event = ChunkEvent::final_chunk(request_id, chunk_index, monotonic_ms);
            event.delta = content.map(str::to_string);
            return Ok(Some(event));
        }

        Ok(content.map(|c| ChunkEvent::delta(request_id, chunk_index, c, monotonic_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_targets_native_chat_endpoint() {
        let req = Request::chat("ollama", "llama3.2", vec![Message::user("hi")]);
        let vendor_req = OllamaAdapter.encode(&req, "", &NetworkConfig::default()).unwrap();
        assert!(vendor_req.url.ends_with("/api/chat"));
    }

    #[test]
    fn stream_line_done_is_final() {
        let raw = br#"{"message":{"content":"world"},"done":true,"prompt_eval_count":3,"eval_count":2}"#;
        let event = OllamaAdapter.decode_stream_chunk("r1", 1, 9, raw).unwrap().unwrap();
        assert!(event.stream_end);
        assert_eq!(event.kind, ChunkKind::Final);
    }

    #[test]
    fn decode_maps_500_to_upstream_5xx() {
        let req = Request::chat("ollama", "llama3.2", vec![Message::user("hi")]);
        let response = VendorHttpResponse {
            status: 500,
            headers: HashMap::new(),
            body: json!({"error": {"message": "model crashed"}}),
        };
        let err = OllamaAdapter.decode(&req, &response).unwrap_err();
        assert_eq!(err.kind, gw_core::error::ErrorKind::Upstream5xx);
    }
}
