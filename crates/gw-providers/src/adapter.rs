//! The `ProviderAdapter` strategy trait (spec C2, §4.2).
//!
//! Generalized from a "complete/stream a conversation" single-provider
//! trait to the gateway's four-call contract: encode the unified request,
//! decode a non-streaming response, decode one streamed chunk, and
//! classify a vendor error.

use gw_core::{ChunkEvent, GatewayError, NetworkConfig, Request, Response};

use crate::error_classify::ClassifiedError;
use crate::vendor_http::{VendorHttpRequest, VendorHttpResponse};

/// Per-vendor encode/decode/stream-parse/classify contract.
///
/// Adapters are stateless: they read provider config (base URL, headers,
/// proxy) only through the arguments passed to each call, never from
/// internal state, so one adapter instance can serve every key and every
/// in-flight request for its provider concurrently.
pub trait ProviderAdapter: Send + Sync {
    /// The provider name this adapter serves (e.g. `"openai"`).
    fn name(&self) -> &'static str;

    /// Translate a unified request into a vendor-shaped HTTP request.
    fn encode(&self, request: &Request, secret: &str, network: &NetworkConfig) -> Result<VendorHttpRequest, GatewayError>;

    /// Translate a vendor HTTP response into a unified response.
    fn decode(&self, request: &Request, response: &VendorHttpResponse) -> Result<Response, GatewayError>;

    /// Parse one raw SSE/stream frame into a [`ChunkEvent`]. `chunk_index`
    /// is supplied by the caller (the worker owns indexing); `monotonic_ms`
    /// is elapsed time since the stream started.
    fn decode_stream_chunk(
        &self,
        request_id: &str,
        chunk_index: u32,
        monotonic_ms: u64,
        raw_bytes: &[u8],
    ) -> Result<Option<ChunkEvent>, GatewayError>;

    /// Synthesize the final chunk for a stream that closed without one
    /// (spec §4.2: "Streaming adapters must emit exactly one final
    /// ChunkEvent per stream even when the upstream closes without one").
    fn synthesize_final(&self, request_id: &str, chunk_index: u32, monotonic_ms: u64) -> ChunkEvent {
        ChunkEvent::final_chunk(request_id, chunk_index, monotonic_ms)
    }

    /// Classify a vendor HTTP error response.
    fn classify_error(&self, status: u16, body: &serde_json::Value, retry_after_secs: Option<u64>) -> ClassifiedError {
        crate::error_classify::classify_http(status, body, retry_after_secs)
    }
}
