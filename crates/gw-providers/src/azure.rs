//! Azure OpenAI adapter: wire-compatible with OpenAI's chat completions
//! shape, but addressed by deployment name and an `api-key` header instead
//! of the OpenAI `/v1` path and bearer token.

use std::collections::HashMap;

use gw_core::{GatewayError, NetworkConfig, Request, Response};

use crate::adapter::ProviderAdapter;
use crate::openai::{decode_message, encode_messages};
use crate::vendor_http::{VendorHttpRequest, VendorHttpResponse};
use gw_core::response::{LatencyInfo, ResponseCommon, TokenUsage};
use gw_core::ResponsePayload;
use serde_json::{json, Value};

const DEFAULT_API_VERSION: &str = "2024-06-01";

pub struct AzureAdapter;

impl ProviderAdapter for AzureAdapter {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn encode(&self, request: &Request, secret: &str, network: &NetworkConfig) -> Result<VendorHttpRequest, GatewayError> {
        let messages = request
            .payload
            .messages()
            .ok_or_else(|| GatewayError::validation("azure adapter only supports chat-like payloads"))?;

        let mut body = json!({
            "messages": encode_messages(messages),
            "stream": request.common.stream,
        });
        if let Some(t) = request.common.params.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = request.common.params.max_tokens {
            body["max_tokens"] = json!(m);
        }

        let mut headers = HashMap::new();
        headers.insert("api-key".into(), secret.to_string());
        headers.insert("Content-Type".into(), "application/json".into());
        for (k, v) in &network.extra_headers {
            headers.insert(k.clone(), v.clone());
        }

        // `base_url` is expected to already name the resource, e.g.
        // `https://my-resource.openai.azure.com/openai/deployments/<deployment>`.
        // The model field carries the deployment name by convention.
        let api_version = network
            .extra_headers
            .get("api-version")
            .map(String::as_str)
            .unwrap_or(DEFAULT_API_VERSION);

        Ok(VendorHttpRequest {
            method: "POST",
            url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                network.base_url.trim_end_matches('/'),
                request.common.model,
                api_version,
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

        let choice = response
            .body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .ok_or_else(|| GatewayError::internal("azure response missing choices[0]"))?;
        let message = decode_message(choice.get("message").unwrap_or(&Value::Null));

        let usage = response.body.get("usage").map_or(TokenUsage::default(), |u| TokenUsage {
            prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            completion_tokens: u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        });

        Ok(Response {
            common: ResponseCommon {
                provider: "azure".into(),
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
    ) -> Result<Option<gw_core::ChunkEvent>, GatewayError> {
        crate::openai::OpenAiAdapter.decode_stream_chunk(request_id, chunk_index, monotonic_ms, raw_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_uses_deployment_path_and_api_key_header() {
        let mut network = NetworkConfig::default();
        network.base_url = "https://my-resource.openai.azure.com".into();
        let req = Request::chat("azure", "gpt-4o-deploy", vec![gw_core::Message::user("hi")]);
        let vendor_req = AzureAdapter.encode(&req, "azure-secret", &network).unwrap();
        assert!(vendor_req.url.contains("/openai/deployments/gpt-4o-deploy/chat/completions"));
        assert_eq!(vendor_req.headers.get("api-key").unwrap(), "azure-secret");
    }

    #[test]
    fn decode_maps_400_to_validation_error_kind() {
        let req = Request::chat("azure", "gpt-4o-deploy", vec![gw_core::Message::user("hi")]);
        let response = VendorHttpResponse {
            status: 400,
            headers: HashMap::new(),
            body: json!({"error": {"message": "bad request"}}),
        };
        let err = AzureAdapter.decode(&req, &response).unwrap_err();
        assert_eq!(err.kind, gw_core::error::ErrorKind::Validation);
    }
}
