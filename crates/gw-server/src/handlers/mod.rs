//! HTTP surface (spec §6): request/response DTOs and
//! `State(state): State<AppState>` handlers, split one module per
//! resource family instead of one flat file since this surface is larger.

pub mod audio;
pub mod cache;
pub mod chat;
pub mod mcp_admin;
pub mod mcp_tool;
pub mod metrics;
pub mod text;

use axum::http::HeaderMap;
use gw_mcp::mediator::ToolFilterOverrides;

/// `x-bf-cache-key` / `x-bf-cache-ttl` (spec §6).
pub(crate) struct CacheHeaders {
    pub key: Option<String>,
    pub ttl: std::time::Duration,
}

const DEFAULT_CACHE_TTL_SECS: u64 = 300;

pub(crate) fn cache_headers(headers: &HeaderMap) -> CacheHeaders {
    let key = headers.get("x-bf-cache-key").and_then(|v| v.to_str().ok()).map(str::to_string);
    let ttl = headers
        .get("x-bf-cache-ttl")
        .and_then(|v| v.to_str().ok())
        .and_then(crate::cache::parse_ttl)
        .unwrap_or_else(|| std::time::Duration::from_secs(DEFAULT_CACHE_TTL_SECS));
    CacheHeaders { key, ttl }
}

fn header_list(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// `mcp-include-clients` / `mcp-exclude-clients` / `mcp-include-tools` /
/// `mcp-exclude-tools` (spec §4.7 / §6).
pub(crate) fn tool_filter_overrides(headers: &HeaderMap) -> ToolFilterOverrides {
    ToolFilterOverrides {
        include_tools: header_list(headers, "mcp-include-tools"),
        exclude_tools: header_list(headers, "mcp-exclude-tools"),
        include_clients: header_list(headers, "mcp-include-clients"),
        exclude_clients: header_list(headers, "mcp-exclude-clients"),
    }
}

/// Virtual-key authentication header (spec §6: "as configured"); the
/// gateway accepts either an OpenAI-style bearer token or a bare
/// `x-virtual-key` header, both carrying the virtual key's id.
pub(crate) fn virtual_key_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(bearer) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = bearer.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    headers.get("x-virtual-key").and_then(|v| v.to_str().ok()).map(str::to_string)
}
