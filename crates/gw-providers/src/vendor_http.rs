//! Vendor-facing HTTP request/response types produced and consumed by
//! adapters' `encode`/`decode`.

use std::collections::HashMap;

use serde_json::Value;

/// An HTTP request shaped for a specific vendor's wire format.
#[derive(Clone, Debug)]
pub struct VendorHttpRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

/// A vendor's raw HTTP response, as received by the worker before decoding.
#[derive(Clone, Debug)]
pub struct VendorHttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
}
