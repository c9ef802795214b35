//! AWS Bedrock adapter, targeting the Converse API
//! (`/model/{id}/converse` and `/model/{id}/converse-stream`).
//!
//! Bedrock's usual auth is SigV4, which needs the request method, path, and
//! body to compute — incompatible with this crate's stateless
//! encode-only-needs-the-secret-string adapter contract. This adapter
//! targets Bedrock's newer long-term API key support instead (a bearer
//! token passed as `secret`), keeping every adapter in this crate to the
//! same shape.

use std::collections::HashMap;

use gw_core::message::Role;
use gw_core::response::{LatencyInfo, ResponseCommon, TokenUsage};
use gw_core::{ChunkEvent, GatewayError, Message, NetworkConfig, Request, Response, ResponsePayload};
use serde_json::{json, Value};

use crate::adapter::ProviderAdapter;
use crate::vendor_http::{VendorHttpRequest, VendorHttpResponse};

pub struct BedrockAdapter;

impl ProviderAdapter for BedrockAdapter {
    fn name(&self) -> &'static str {
        "bedrock"
    }

    fn encode(&self, request: &Request, secret: &str, network: &NetworkConfig) -> Result<VendorHttpRequest, GatewayError> {
        let messages = request
            .payload
            .messages()
            .ok_or_else(|| GatewayError::validation("bedrock adapter only supports chat-like payloads"))?;

        let system: Vec<Value> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| json!({"text": m.content}))
            .collect();
        let turns: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                json!({
                    "role": if m.role == Role::Assistant { "assistant" } else { "user" },
                    "content": [{"text": m.content}],
                })
            })
            .collect();

        let mut inference_config = json!({});
        if let Some(t) = request.common.params.temperature {
            inference_config["temperature"] = json!(t);
        }
        if let Some(p) = request.common.params.top_p {
            inference_config["topP"] = json!(p);
        }
        if let Some(m) = request.common.params.max_tokens {
            inference_config["maxTokens"] = json!(m);
        }

        let mut body = json!({
            "messages": turns,
            "inferenceConfig": inference_config,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }

        let mut headers = HashMap::new();
        headers.insert("Authorization".into(), format!("Bearer {secret}"));
        headers.insert("Content-Type".into(), "application/json".into());
        for (k, v) in &network.extra_headers {
            headers.insert(k.clone(), v.clone());
        }

        let base = if network.base_url.is_empty() {
            "https://bedrock-runtime.us-east-1.amazonaws.com"
        } else {
            network.base_url.as_str()
        };
        let op = if request.common.stream { "converse-stream" } else { "converse" };

        Ok(VendorHttpRequest {
            method: "POST",
            url: format!("{base}/model/{}/{op}", request.common.model),
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
            .get("output")
            .and_then(|o| o.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let usage = response.body.get("usage").map_or(TokenUsage::default(), |u| {
            let prompt = u.get("inputTokens").and_then(Value::as_u64).unwrap_or(0) as u32;
            let completion = u.get("outputTokens").and_then(Value::as_u64).unwrap_or(0) as u32;
            TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }
        });

        Ok(Response {
            common: ResponseCommon {
                provider: "bedrock".into(),
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
        if line.is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| GatewayError::internal(format!("bad bedrock stream event json: {e}")))?;

        if value.get("messageStop").is_some() {
            return Ok(Some(ChunkEvent::final_chunk(request_id, chunk_index, monotonic_ms)));
        }
        let text = value
            .get("contentBlockDelta")
            .and_then(|d| d.get("delta"))
            .and_then(|d| d.get("text"))
            .and_then(Value::as_str);

        Ok(text.map(|t| ChunkEvent::delta(request_id, chunk_index, t, monotonic_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_groups_system_messages_separately() {
        let req = Request::chat(
            "bedrock",
            "anthropic.claude-3-5-sonnet-20240620-v1:0",
            vec![Message::system("be terse"), Message::user("hi")],
        );
        let vendor_req = BedrockAdapter.encode(&req, "bedrock-key", &NetworkConfig::default()).unwrap();
        assert_eq!(vendor_req.body["system"].as_array().unwrap().len(), 1);
        assert_eq!(vendor_req.body["messages"].as_array().unwrap().len(), 1);
        assert!(vendor_req.url.ends_with("/converse"));
    }

    #[test]
    fn message_stop_event_is_final() {
        let raw = br#"{"messageStop":{"stopReason":"end_turn"}}"#;
        let event = BedrockAdapter.decode_stream_chunk("r1", 1, 10, raw).unwrap().unwrap();
        assert!(event.stream_end);
    }

    #[test]
    fn decode_maps_500_to_upstream_5xx() {
        let req = Request::chat("bedrock", "anthropic.claude-3-5-sonnet-20240620-v1:0", vec![Message::user("hi")]);
        let response = VendorHttpResponse {
            status: 500,
            headers: HashMap::new(),
            body: json!({"error": {"message": "internal failure"}}),
        };
        let err = BedrockAdapter.decode(&req, &response).unwrap_err();
        assert_eq!(err.kind, gw_core::error::ErrorKind::Upstream5xx);
    }
}
