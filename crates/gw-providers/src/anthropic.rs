//! Anthropic Messages API adapter.

use std::collections::HashMap;

use gw_core::chunk::ChunkKind;
use gw_core::message::Role;
use gw_core::response::{LatencyInfo, ResponseCommon, TokenUsage};
use gw_core::{ChunkEvent, GatewayError, Message, NetworkConfig, Request, Response, ResponsePayload};
use serde_json::{json, Value};

use crate::adapter::ProviderAdapter;
use crate::vendor_http::{VendorHttpRequest, VendorHttpResponse};

pub struct AnthropicAdapter;

fn split_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
    let mut system = None;
    let mut rest = Vec::new();
    for m in messages {
        if m.role == Role::System && system.is_none() {
            system = Some(m.content.clone());
        } else {
            rest.push(m);
        }
    }
    (system, rest)
}

impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn encode(&self, request: &Request, secret: &str, network: &NetworkConfig) -> Result<VendorHttpRequest, GatewayError> {
        let messages = request
            .payload
            .messages()
            .ok_or_else(|| GatewayError::validation("anthropic adapter only supports chat-like payloads"))?;
        let (system, rest) = split_system(messages);

        let mut body = json!({
            "model": request.common.model,
            "max_tokens": request.common.params.max_tokens.unwrap_or(4096),
            "stream": request.common.stream,
            "messages": rest.iter().map(|m| json!({
                "role": if m.role == Role::Assistant { "assistant" } else { "user" },
                "content": m.content,
            })).collect::<Vec<_>>(),
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(t) = request.common.params.temperature {
            body["temperature"] = json!(t);
        }
        if !request.common.tools.is_empty() {
            body["tools"] = json!(request
                .common
                .tools
                .iter()
                .map(|t| json!({"name": t.name, "description": t.description, "input_schema": t.parameters}))
                .collect::<Vec<_>>());
        }

        let mut headers = HashMap::new();
        headers.insert("x-api-key".into(), secret.to_string());
        headers.insert("anthropic-version".into(), "2023-06-01".into());
        headers.insert("content-type".into(), "application/json".into());
        for (k, v) in &network.extra_headers {
            headers.insert(k.clone(), v.clone());
        }

        let base = if network.base_url.is_empty() {
            "https://api.anthropic.com/v1"
        } else {
            network.base_url.as_str()
        };

        Ok(VendorHttpRequest {
            method: "POST",
            url: format!("{base}/messages"),
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

        let text = response
            .body
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| blocks.iter().find(|b| b.get("type").and_then(Value::as_str) == Some("text")))
            .and_then(|b| b.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let usage = response.body.get("usage").map_or(TokenUsage::default(), |u| {
            let prompt = u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
            let completion = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
            TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }
        });

        Ok(Response {
            common: ResponseCommon {
                provider: "anthropic".into(),
                model: request.common.model.clone(),
                usage,
                latency: LatencyInfo::default(),
                cache: Default::default(),
                raw: None,
                fallback_index: 0,
                number_of_retries: 0,
            },
            payload: ResponsePayload::Chat {
                message: Message::assistant(text),
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
        let line = std::str::from_utf8(raw_bytes).unwrap_or_default().trim();
        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            return Ok(None);
        };
        let value: Value = serde_json::from_str(data)
            .map_err(|e| GatewayError::internal(format!("bad anthropic SSE chunk json: {e}")))?;

        match value.get("type").and_then(Value::as_str) {
            Some("content_block_delta") => {
                let text = value
                    .get("delta")
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Ok(Some(ChunkEvent::delta(request_id, chunk_index, text, monotonic_ms)))
            }
            Some("message_stop") => Ok(Some(ChunkEvent::final_chunk(request_id, chunk_index, monotonic_ms))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_splits_system_message() {
        let req = Request::chat(
            "anthropic",
            "claude-3-5-sonnet-20240620",
            vec![Message::system("be terse"), Message::user("2+2")],
        );
        let vendor_req = AnthropicAdapter.encode(&req, "sk-ant", &NetworkConfig::default()).unwrap();
        assert_eq!(vendor_req.body["system"], json!("be terse"));
        assert_eq!(vendor_req.body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn stream_delta_event_decoded() {
        let raw = br#"data: {"type":"content_block_delta","delta":{"text":"Hi"}}"#;
        let event = AnthropicAdapter.decode_stream_chunk("r1", 0, 5, raw).unwrap().unwrap();
        assert_eq!(event.kind, ChunkKind::Delta);
        assert_eq!(event.delta.as_deref(), Some("Hi"));
    }

    #[test]
    fn decode_maps_403_to_permission_error_kind() {
        let req = Request::chat("anthropic", "claude-3-5-sonnet-20240620", vec![Message::user("hi")]);
        let response = VendorHttpResponse {
            status: 403,
            headers: HashMap::new(),
            body: json!({"error": {"message": "forbidden"}}),
        };
        let err = AnthropicAdapter.decode(&req, &response).unwrap_err();
        assert_eq!(err.kind, gw_core::error::ErrorKind::Permission);
    }
}
