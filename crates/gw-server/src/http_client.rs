//! The actual HTTP call. Provider adapters (`gw-providers`) only translate
//! between the unified model and vendor JSON shapes (spec §4.2: "adapters
//! are stateless ... the actual HTTP call is the Worker Pool's job"); this
//! module is that job's `reqwest` client.

use std::time::Duration;

use futures::Stream;
use gw_core::error::ErrorKind;
use gw_core::GatewayError;
use gw_providers::vendor_http::{VendorHttpRequest, VendorHttpResponse};

/// Thin wrapper so `WorkerPool` doesn't reach into `reqwest` directly; one
/// instance is shared by every provider's worker pool.
#[derive(Clone)]
pub struct VendorHttpClient {
    client: reqwest::Client,
}

impl VendorHttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Build a client pinned to a per-provider proxy, if configured.
    pub fn with_proxy(proxy: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy_url) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Issue a non-streaming request and collect the response body as JSON
    /// (falling back to a JSON string wrapper for non-JSON bodies so
    /// `decode` still has something to inspect).
    pub async fn execute(&self, request: &VendorHttpRequest, timeout: Duration) -> Result<VendorHttpResponse, GatewayError> {
        let response = self.send(request, timeout).await?;
        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(&e))?;
        let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        });
        Ok(VendorHttpResponse { status, headers, body })
    }

    /// Issue a streaming request and return the status/headers plus a byte
    /// stream the worker splits into frames for the adapter's
    /// `decode_stream_chunk`.
    pub async fn execute_stream(
        &self,
        request: &VendorHttpRequest,
        timeout: Duration,
    ) -> Result<(u16, impl Stream<Item = reqwest::Result<bytes::Bytes>>), GatewayError> {
        let response = self.send(request, timeout).await?;
        let status = response.status().as_u16();
        if status >= 400 {
            let headers = header_map(response.headers());
            let bytes = response.bytes().await.unwrap_or_default();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
            let retry_after = gw_providers::error_classify::retry_after_from_headers(&headers);
            let classified = gw_providers::error_classify::classify_http(status, &body, retry_after);
            let mut err = GatewayError::new(gw_providers::error_classify::error_kind_for_class(classified.class), classified.message);
            if let Some(secs) = classified.retry_after_secs {
                err = err.retry_after(secs);
            }
            return Err(err);
        }
        Ok((status, response.bytes_stream()))
    }

    async fn send(&self, request: &VendorHttpRequest, timeout: Duration) -> Result<reqwest::Response, GatewayError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).unwrap_or(reqwest::Method::POST);
        let mut builder = self.client.request(method, &request.url).timeout(timeout).json(&request.body);
        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        builder.send().await.map_err(|e| transport_error(&e))
    }
}

impl Default for VendorHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn header_map(headers: &reqwest::header::HeaderMap) -> std::collections::HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect()
}

/// Classify a transport-level `reqwest::Error` into the two error kinds the
/// worker's retry loop cares about (spec §4.3: "connection reset, DNS
/// failure" vs. a hard timeout).
fn transport_error(err: &reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::new(ErrorKind::UpstreamTimeout, err.to_string())
    } else {
        GatewayError::new(ErrorKind::Upstream5xx, err.to_string()).allow_fallbacks(true)
    }
}
