//! OpenAI adapter: the reference adapter other "OpenAI-compatible" vendors
//! (Azure, Mistral, Ollama) share conventions with.

use std::collections::HashMap;

use gw_core::chunk::ChunkKind;
use gw_core::message::{Role, ToolCall};
use gw_core::response::{LatencyInfo, ResponseCommon, TokenUsage};
use gw_core::{ChunkEvent, GatewayError, Message, NetworkConfig, Request, RequestPayload, Response, ResponsePayload};
use serde_json::{json, Value};

use crate::adapter::ProviderAdapter;
use crate::vendor_http::{VendorHttpRequest, VendorHttpResponse};

pub struct OpenAiAdapter;

/// Serialize unified messages into OpenAI's `messages` array shape.
pub(crate) fn encode_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut obj = json!({
                "role": m.role.to_string(),
                "content": m.content,
            });
            if let Some(name) = &m.name {
                obj["name"] = json!(name);
            }
            if let Some(id) = &m.tool_call_id {
                obj["tool_call_id"] = json!(id);
            }
            if !m.tool_calls.is_empty() {
                obj["tool_calls"] = json!(m
                    .tool_calls
                    .iter()
                    .map(|tc| json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {"name": tc.name, "arguments": tc.arguments},
                    }))
                    .collect::<Vec<_>>());
            }
            obj
        })
        .collect()
}

pub(crate) fn decode_message(value: &Value) -> Message {
    let role = match value.get("role").and_then(Value::as_str).unwrap_or("assistant") {
        "system" => Role::System,
        "user" => Role::User,
        "tool" => Role::Tool,
        _ => Role::Assistant,
    };
    let content = value
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tool_calls = value
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    Some(ToolCall {
                        id: tc.get("id")?.as_str()?.to_string(),
                        name: tc.get("function")?.get("name")?.as_str()?.to_string(),
                        arguments: tc
                            .get("function")?
                            .get("arguments")
                            .and_then(Value::as_str)
                            .unwrap_or("{}")
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Message {
        role,
        content,
        name: None,
        tool_call_id: None,
        tool_calls,
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn encode(&self, request: &Request, secret: &str, network: &NetworkConfig) -> Result<VendorHttpRequest, GatewayError> {
        let messages = request
            .payload
            .messages()
            .ok_or_else(|| GatewayError::validation("openai adapter only supports chat-like payloads"))?;

        let mut body = json!({
            "model": request.common.model,
            "messages": encode_messages(messages),
            "stream": request.common.stream,
        });
        if let Some(t) = request.common.params.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = request.common.params.max_tokens {
            body["max_tokens"] = json!(m);
        }
        if let Some(p) = request.common.params.top_p {
            body["top_p"] = json!(p);
        }
        if !request.common.params.stop.is_empty() {
            body["stop"] = json!(request.common.params.stop);
        }
        if !request.common.tools.is_empty() {
            body["tools"] = json!(request
                .common
                .tools
                .iter()
                .map(|t| json!({
                    "type": "function",
                    "function": {"name": t.name, "description": t.description, "parameters": t.parameters},
                }))
                .collect::<Vec<_>>());
        }

        let mut headers = HashMap::new();
        headers.insert("Authorization".into(), format!("Bearer {secret}"));
        headers.insert("Content-Type".into(), "application/json".into());
        for (k, v) in &network.extra_headers {
            headers.insert(k.clone(), v.clone());
        }

        let base = if network.base_url.is_empty() {
            "https://api.openai.com/v1"
        } else {
            network.base_url.as_str()
        };

        Ok(VendorHttpRequest {
            method: "POST",
            url: format!("{base}/chat/completions"),
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

        let choice = response
            .body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .ok_or_else(|| GatewayError::internal("openai response missing choices[0]"))?;

        let message = decode_message(choice.get("message").unwrap_or(&Value::Null));

        let usage = response.body.get("usage").map_or(TokenUsage::default(), |u| TokenUsage {
            prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            completion_tokens: u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        });

        let payload = if matches!(request.payload, RequestPayload::Responses { .. }) {
            ResponsePayload::Responses { message }
        } else {
            ResponsePayload::Chat { message }
        };

        Ok(Response {
            common: ResponseCommon {
                provider: "openai".into(),
                model: request.common.model.clone(),
                usage,
                latency: LatencyInfo::default(),
                cache: Default::default(),
                raw: None,
                fallback_index: 0,
                number_of_retries: 0,
            },
            payload,
        })
    }

    fn decode_stream_chunk(
        &self,
        request_id: &str,
        chunk_index: u32,
        monotonic_ms: u64,
        raw_bytes: &[u8],
    ) -> Result<Option<ChunkEvent>, GatewayError> {
        let line = std::str::from_utf8(raw_bytes).unwrap_or_default().trim();
        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            return Ok(None);
        };
        if data == "[DONE]" {
            return Ok(Some(ChunkEvent::final_chunk(request_id, chunk_index, monotonic_ms)));
        }

        let value: Value = serde_json::from_str(data)
            .map_err(|e| GatewayError::internal(format!("bad SSE chunk json: {e}")))?;

        let choice = value.get("choices").and_then(Value::as_array).and_then(|c| c.first());
        let Some(choice) = choice else {
            return Ok(None);
        };

        let delta = choice.get("delta").and_then(|d| d.get("content")).and_then(Value::as_str);
        let finish_reason = choice.get("finish_reason").and_then(Value::as_str);

        if finish_reason.is_some() {
            let mut event = ChunkEvent::final_chunk(request_id, chunk_index, monotonic_ms);
            event.delta = delta.map(str::to_string);
            return Ok(Some(event));
        }

        Ok(delta.map(|d| ChunkEvent::delta(request_id, chunk_index, d, monotonic_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_core::provider_config::NetworkConfig;

    #[test]
    fn encode_sets_bearer_auth_header() {
        let req = Request::chat("openai", "gpt-4o-mini", vec![Message::user("2+2")]);
        let vendor_req = OpenAiAdapter.encode(&req, "sk-test", &NetworkConfig::default()).unwrap();
        assert_eq!(vendor_req.headers.get("Authorization").unwrap(), "Bearer sk-test");
        assert!(vendor_req.url.ends_with("/chat/completions"));
    }

    #[test]
    fn decode_stream_chunk_parses_delta() {
        let raw = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}";
        let event = OpenAiAdapter
            .decode_stream_chunk("req1", 0, 10, raw)
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, ChunkKind::Delta);
        assert_eq!(event.delta.as_deref(), Some("Hel"));
    }

    #[test]
    fn decode_stream_chunk_done_marker_is_final() {
        let event = OpenAiAdapter
            .decode_stream_chunk("req1", 4, 40, b"data: [DONE]")
            .unwrap()
            .unwrap();
        assert!(event.stream_end);
        assert_eq!(event.kind, ChunkKind::Final);
    }

    #[test]
    fn decode_maps_401_to_auth_error_kind() {
        let req = Request::chat("openai", "gpt-4o-mini", vec![Message::user("hi")]);
        let response = VendorHttpResponse {
            status: 401,
            headers: HashMap::new(),
            body: json!({"error": {"message": "invalid api key"}}),
        };
        let err = OpenAiAdapter.decode(&req, &response).unwrap_err();
        assert_eq!(err.kind, gw_core::error::ErrorKind::Auth);
    }

    #[test]
    fn decode_propagates_retry_after_on_rate_limit() {
        let req = Request::chat("openai", "gpt-4o-mini", vec![Message::user("hi")]);
        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), "7".to_string());
        let response = VendorHttpResponse {
            status: 429,
            headers,
            body: json!({"error": {"message": "rate limited"}}),
        };
        let err = OpenAiAdapter.decode(&req, &response).unwrap_err();
        assert_eq!(err.kind, gw_core::error::ErrorKind::RateLimitedUpstream);
        assert_eq!(err.retry_after_secs, Some(7));
    }
}
