//! Google Generative Language API adapter (`generateContent` /
//! `streamGenerateContent`), addressed by API key query parameter rather
//! than a bearer header.

use std::collections::HashMap;

use gw_core::message::Role;
use gw_core::response::{LatencyInfo, ResponseCommon, TokenUsage};
use gw_core::{ChunkEvent, GatewayError, Message, NetworkConfig, Request, Response, ResponsePayload};
use serde_json::{json, Value};

use crate::adapter::ProviderAdapter;
use crate::vendor_http::{VendorHttpRequest, VendorHttpResponse};

pub struct GoogleGenAiAdapter;

fn gemini_role(role: &Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        _ => "user",
    }
}

/// Build the `contents`/`systemInstruction` shape shared by both the
/// non-streaming and streaming encode paths.
fn encode_contents(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();
    for m in messages {
        if m.role == Role::System {
            system_parts.push(json!({"text": m.content}));
            continue;
        }
        contents.push(json!({
            "role": gemini_role(&m.role),
            "parts": [{"text": m.content}],
        }));
    }
    let system_instruction = (!system_parts.is_empty()).then(|| json!({"parts": system_parts}));
    (system_instruction, contents)
}

impl ProviderAdapter for GoogleGenAiAdapter {
    fn name(&self) -> &'static str {
        "google_genai"
    }

    fn encode(&self, request: &Request, secret: &str, network: &NetworkConfig) -> Result<VendorHttpRequest, GatewayError> {
        let messages = request
            .payload
            .messages()
            .ok_or_else(|| GatewayError::validation("google_genai adapter only supports chat-like payloads"))?;
        let (system_instruction, contents) = encode_contents(messages);

        let mut generation_config = json!({});
        if let Some(t) = request.common.params.temperature {
            generation_config["temperature"] = json!(t);
        }
        if let Some(p) = request.common.params.top_p {
            generation_config["topP"] = json!(p);
        }
        if let Some(m) = request.common.params.max_tokens {
            generation_config["maxOutputTokens"] = json!(m);
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if let Some(system_instruction) = system_instruction {
            body["systemInstruction"] = system_instruction;
        }

        let mut headers = HashMap::new();
        headers.insert("Content-Type".into(), "application/json".into());
        for (k, v) in &network.extra_headers {
            headers.insert(k.clone(), v.clone());
        }

        let base = if network.base_url.is_empty() {
            "https://generativelanguage.googleapis.com/v1beta"
        } else {
            network.base_url.as_str()
        };
        let method_name = if request.common.stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };

        Ok(VendorHttpRequest {
            method: "POST",
            url: format!(
                "{base}/models/{}:{method_name}?key={secret}",
                request.common.model
            ),
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
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .and_then(|parts| parts.first())
            .and_then(|p| p.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let usage = response
            .body
            .get("usageMetadata")
            .map_or(TokenUsage::default(), |u| {
                let prompt = u.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32;
                let completion = u.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32;
                TokenUsage {
                    prompt_tokens: prompt,
                    completion_tokens: completion,
                    total_tokens: prompt + completion,
                }
            });

        Ok(Response {
            common: ResponseCommon {
                provider: "google_genai".into(),
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
        // Google streams a JSON array of candidate objects, one element per
        // SSE `data:` frame, rather than OpenAI's flat per-token deltas.
        let line = std::str::from_utf8(raw_bytes).unwrap_or_default().trim();
        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            return Ok(None);
        };
        if data.is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(data)
            .map_err(|e| GatewayError::internal(format!("bad google_genai SSE chunk json: {e}")))?;

        let candidate = value.get("candidates").and_then(Value::as_array).and_then(|c| c.first());
        let Some(candidate) = candidate else {
            return Ok(None);
        };

        let text = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .and_then(|parts| parts.first())
            .and_then(|p| p.get("text"))
            .and_then(Value::as_str);

        let finish_reason = candidate.get("finishReason").and_then(Value::as_str);
        if finish_reason.is_some() {
            let mut event = ChunkEvent::final_chunk(request_id, chunk_index, monotonic_ms);
            event.delta = text.map(str::to_string);
            return Ok(Some(event));
        }

        Ok(text.map(|t| ChunkEvent::delta(request_id, chunk_index, t, monotonic_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_routes_system_messages_to_system_instruction() {
        let req = Request::chat(
            "google_genai",
            "gemini-1.5-pro",
            vec![Message::system("be terse"), Message::user("2+2")],
        );
        let vendor_req = GoogleGenAiAdapter.encode(&req, "api-key-123", &NetworkConfig::default()).unwrap();
        assert!(vendor_req.body.get("systemInstruction").is_some());
        assert_eq!(vendor_req.body["contents"].as_array().unwrap().len(), 1);
        assert!(vendor_req.url.contains("key=api-key-123"));
    }

    #[test]
    fn decode_stream_chunk_with_finish_reason_is_final() {
        let raw = br#"data: {"candidates":[{"content":{"parts":[{"text":"done"}]},"finishReason":"STOP"}]}"#;
        let event = GoogleGenAiAdapter.decode_stream_chunk("r1", 3, 30, raw).unwrap().unwrap();
        assert!(event.stream_end);
    }

    #[test]
    fn decode_maps_429_to_rate_limited_upstream() {
        let req = Request::chat("google_genai", "gemini-1.5-pro", vec![Message::user("hi")]);
        let response = VendorHttpResponse {
            status: 429,
            headers: HashMap::new(),
            body: json!({"error": {"message": "quota exceeded"}}),
        };
        let err = GoogleGenAiAdapter.decode(&req, &response).unwrap_err();
        assert_eq!(err.kind, gw_core::error::ErrorKind::RateLimitedUpstream);
    }
}
