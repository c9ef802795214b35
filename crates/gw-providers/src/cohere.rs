//! Cohere adapter: Cohere's `/v1/chat` endpoint, which splits the latest
//! user turn out of `message` from the rest of the turns in `chat_history`
//! instead of a flat OpenAI-style `messages` array.

use std::collections::HashMap;

use gw_core::message::Role;
use gw_core::response::{LatencyInfo, ResponseCommon, TokenUsage};
use gw_core::{ChunkEvent, GatewayError, Message, NetworkConfig, Request, Response, ResponsePayload};
use serde_json::{json, Value};

use crate::adapter::ProviderAdapter;
use crate::vendor_http::{VendorHttpRequest, VendorHttpResponse};

pub struct CohereAdapter;

fn cohere_role(role: Role) -> &'static str {
    match role {
        Role::User => "USER",
        Role::Assistant => "CHATBOT",
        Role::System => "SYSTEM",
        Role::Tool => "TOOL",
    }
}

impl ProviderAdapter for CohereAdapter {
    fn name(&self) -> &'static str {
        "cohere"
    }

    fn encode(&self, request: &Request, secret: &str, network: &NetworkConfig) -> Result<VendorHttpRequest, GatewayError> {
        let messages = request
            .payload
            .messages()
            .ok_or_else(|| GatewayError::validation("cohere adapter only supports chat-like payloads"))?;
        let (history, last) = messages
            .split_last()
            .map(|(last, rest)| (rest, last))
            .ok_or_else(|| GatewayError::validation("cohere adapter requires at least one message"))?;

        let mut body = json!({
            "model": request.common.model,
            "message": last.content,
            "chat_history": history.iter().map(|m| json!({
                "role": cohere_role(m.role),
                "message": m.content,
            })).collect::<Vec<_>>(),
            "stream": request.common.stream,
        });
        if let Some(t) = request.common.params.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = request.common.params.top_p {
            body["p"] = json!(p);
        }
        if let Some(m) = request.common.params.max_tokens {
            body["max_tokens"] = json!(m);
        }

        let mut headers = HashMap::new();
        headers.insert("Authorization".into(), format!("Bearer {secret}"));
        headers.insert("Content-Type".into(), "application/json".into());
        for (k, v) in &network.extra_headers {
            headers.insert(k.clone(), v.clone());
        }

        let base = if network.base_url.is_empty() {
            "https://api.cohere.com/v1"
        } else {
            network.base_url.as_str()
        };

        Ok(VendorHttpRequest {
            method: "POST",
            url: format!("{base}/chat"),
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
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let usage = response
            .body
            .get("meta")
            .and_then(|m| m.get("tokens"))
            .map_or(TokenUsage::default(), |u| {
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
                provider: "cohere".into(),
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
            .map_err(|e| GatewayError::internal(format!("bad cohere stream line json: {e}")))?;

        match value.get("event_type").and_then(Value::as_str) {
            Some("text-generation") => {
                let text = value.get("text").and_then(Value::as_str).unwrap_or_default();
                Ok(Some(ChunkEvent::delta(request_id, chunk_index, text, monotonic_ms)))
            }
            Some("stream-end") => Ok(Some(ChunkEvent::final_chunk(request_id, chunk_index, monotonic_ms))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_splits_last_message_from_history() {
        let req = Request::chat(
            "cohere",
            "command-r-plus",
            vec![Message::user("first"), Message::assistant("reply"), Message::user("second")],
        );
        let vendor_req = CohereAdapter.encode(&req, "sk-cohere", &NetworkConfig::default()).unwrap();
        assert_eq!(vendor_req.body["message"], json!("second"));
        assert_eq!(vendor_req.body["chat_history"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn stream_end_event_is_final() {
        let raw = br#"{"event_type":"stream-end"}"#;
        let event = CohereAdapter.decode_stream_chunk("r1", 2, 20, raw).unwrap().unwrap();
        assert!(event.stream_end);
    }

    #[test]
    fn decode_maps_401_to_auth_error_kind() {
        let req = Request::chat("cohere", "command-r-plus", vec![Message::user("hi")]);
        let response = VendorHttpResponse {
            status: 401,
            headers: HashMap::new(),
            body: json!({"error": {"message": "invalid token"}}),
        };
        let err = CohereAdapter.decode(&req, &response).unwrap_err();
        assert_eq!(err.kind, gw_core::error::ErrorKind::Auth);
    }
}
