//! Mistral AI adapter: another OpenAI-compatible chat completions surface,
//! reached over Mistral's own hosted base URL.

use std::collections::HashMap;

use gw_core::response::{LatencyInfo, ResponseCommon, TokenUsage};
use gw_core::{ChunkEvent, GatewayError, NetworkConfig, Request, Response, ResponsePayload};
use serde_json::{json, Value};

use crate::adapter::ProviderAdapter;
use crate::openai::{decode_message, encode_messages};
use crate::vendor_http::{VendorHttpRequest, VendorHttpResponse};

pub struct MistralAdapter;

impl ProviderAdapter for MistralAdapter {
    fn name(&self) -> &'static str {
        "mistral"
    }

    fn encode(&self, request: &Request, secret: &str, network: &NetworkConfig) -> Result<VendorHttpRequest, GatewayError> {
        let messages = request
            .payload
            .messages()
            .ok_or_else(|| GatewayError::validation("mistral adapter only supports chat-like payloads"))?;

        let mut body = json!({
            "model": request.common.model,
            "messages": encode_messages(messages),
            "stream": request.common.stream,
        });
        if let Some(t) = request.common.params.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = request.common.params.top_p {
            body["top_p"] = json!(p);
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
            "https://api.mistral.ai/v1"
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
            .ok_or_else(|| GatewayError::internal("mistral response missing choices[0]"))?;
        let message = decode_message(choice.get("message").unwrap_or(&Value::Null));

        let usage = response.body.get("usage").map_or(TokenUsage::default(), |u| TokenUsage {
            prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            completion_tokens: u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        });

        Ok(Response {
            common: ResponseCommon {
                provider: "mistral".into(),
                model: request.common.model.clone(),
                usage,
                latency: LatencyInfo::default(),
                cache: Default::default(),
                raw: None,
                fallback_index: 0,
                number_of_retries: 0,
            },
            payload: ResponsePayload::Chat { message },
        })
    }

    fn decode_stream_chunk(
        &self,
        request_id: &str,
        chunk_index: u32,
        monotonic_ms: u64,
        raw_bytes: &[u8],
    ) -> Result<Option<ChunkEvent>, GatewayError> {
        crate::openai::OpenAiAdapter.decode_stream_chunk(request_id, chunk_index, monotonic_ms, raw_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_targets_mistral_base_url_by_default() {
        let req = Request::chat("mistral", "mistral-large-latest", vec![gw_core::Message::user("hi")]);
        let vendor_req = MistralAdapter.encode(&req, "sk-mistral", &NetworkConfig::default()).unwrap();
        assert!(vendor_req.url.starts_with("https://api.mistral.ai"));
    }

    #[test]
    fn decode_maps_404_to_validation_error_kind() {
        let req = Request::chat("mistral", "mistral-large-latest", vec![gw_core::Message::user("hi")]);
        let response = VendorHttpResponse {
            status: 404,
            headers: HashMap::new(),
            body: json!({"error": {"message": "model not found"}}),
        };
        let err = MistralAdapter.decode(&req, &response).unwrap_err();
        assert_eq!(err.kind, gw_core::error::ErrorKind::Validation);
    }
}
