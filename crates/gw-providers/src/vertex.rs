//! Google Vertex AI adapter: the same `generateContent` content/parts shape
//! as [`crate::google_genai`], but addressed by GCP project/location and
//! authenticated with an OAuth bearer token instead of an API key query
//! parameter.

use std::collections::HashMap;

use gw_core::{ChunkEvent, GatewayError, NetworkConfig, Request, Response};
#[cfg(test)]
use gw_core::Message;

use crate::adapter::ProviderAdapter;
use crate::google_genai::GoogleGenAiAdapter;
use crate::vendor_http::{VendorHttpRequest, VendorHttpResponse};

/// `network.extra_headers` carries the two fields Vertex needs beyond what
/// `generateContent`'s body already has: `x-goog-project` and
/// `x-goog-location`, since [`NetworkConfig`] has no dedicated GCP fields.
const PROJECT_HEADER: &str = "x-goog-project";
const LOCATION_HEADER: &str = "x-goog-location";
const DEFAULT_LOCATION: &str = "us-central1";

pub struct VertexAdapter;

impl ProviderAdapter for VertexAdapter {
    fn name(&self) -> &'static str {
        "vertex"
    }

    fn encode(&self, request: &Request, secret: &str, network: &NetworkConfig) -> Result<VendorHttpRequest, GatewayError> {
        // Delegate body construction to the GenAI adapter, then reshape the
        // transport envelope (URL + auth) for Vertex's project-scoped path.
        let generic = GoogleGenAiAdapter.encode(request, "", network)?;

        let project = network
            .extra_headers
            .get(PROJECT_HEADER)
            .ok_or_else(|| GatewayError::validation("vertex adapter requires x-goog-project in extra_headers"))?;
        let location = network
            .extra_headers
            .get(LOCATION_HEADER)
            .map(String::as_str)
            .unwrap_or(DEFAULT_LOCATION);

        let mut headers = HashMap::new();
        headers.insert("Authorization".into(), format!("Bearer {secret}"));
        headers.insert("Content-Type".into(), "application/json".into());
        for (k, v) in &network.extra_headers {
            if k != PROJECT_HEADER && k != LOCATION_HEADER {
                headers.insert(k.clone(), v.clone());
            }
        }

        let base = if network.base_url.is_empty() {
            format!("https://{location}-aiplatform.googleapis.com/v1")
        } else {
            network.base_url.clone()
        };
        let method_name = if request.common.stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };

        Ok(VendorHttpRequest {
            method: "POST",
            url: format!(
                "{base}/projects/{project}/locations/{location}/publishers/google/models/{}:{method_name}",
                request.common.model
            ),
            headers,
            body: generic.body,
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

        let mut decoded = GoogleGenAiAdapter.decode(request, response)?;
        decoded.common.provider = "vertex".into();
        Ok(decoded)
    }

    fn decode_stream_chunk(
        &self,
        request_id: &str,
        chunk_index: u32,
        monotonic_ms: u64,
        raw_bytes: &[u8],
    ) -> Result<Option<ChunkEvent>, GatewayError> {
        GoogleGenAiAdapter.decode_stream_chunk(request_id, chunk_index, monotonic_ms, raw_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_requires_project_header() {
        let req = Request::chat("vertex", "gemini-1.5-pro", vec![Message::user("hi")]);
        let err = VertexAdapter.encode(&req, "oauth-token", &NetworkConfig::default()).unwrap_err();
        assert_eq!(err.kind, gw_core::error::ErrorKind::Validation);
    }

    #[test]
    fn encode_builds_project_scoped_path() {
        let mut network = NetworkConfig::default();
        network.extra_headers.insert(PROJECT_HEADER.into(), "my-project".into());
        let req = Request::chat("vertex", "gemini-1.5-pro", vec![Message::user("hi")]);
        let vendor_req = VertexAdapter.encode(&req, "oauth-token", &network).unwrap();
        assert!(vendor_req.url.contains("/projects/my-project/locations/us-central1/"));
        assert_eq!(vendor_req.headers.get("Authorization").unwrap(), "Bearer oauth-token");
    }

    #[test]
    fn decode_maps_401_to_auth_error_kind() {
        let req = Request::chat("vertex", "gemini-1.5-pro", vec![Message::user("hi")]);
        let response = VendorHttpResponse {
            status: 401,
            headers: HashMap::new(),
            body: serde_json::json!({"error": {"message": "unauthorized"}}),
        };
        let err = VertexAdapter.decode(&req, &response).unwrap_err();
        assert_eq!(err.kind, gw_core::error::ErrorKind::Auth);
    }
}
