//! JSON-RPC 2.0 envelope used by every MCP transport.
//!
//! An A2A-style request/response/error shape, retargeted at MCP's method
//! names (`initialize`, `tools/list`, `tools/call`) instead of task
//! methods.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// MCP's standard JSON-RPC method names.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const LIST_TOOLS: &str = "tools/list";
    pub const CALL_TOOL: &str = "tools/call";
}

static NEXT_ID: AtomicI64 = AtomicI64::new(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: i64,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params,
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn initialize(client_name: &str) -> Self {
        Self::new(
            methods::INITIALIZE,
            Some(serde_json::json!({
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": client_name, "version": env!("CARGO_PKG_VERSION")},
                "capabilities": {},
            })),
        )
    }

    pub fn list_tools() -> Self {
        Self::new(methods::LIST_TOOLS, None)
    }

    pub fn call_tool(name: &str, arguments: Value) -> Self {
        Self::new(methods::CALL_TOOL, Some(serde_json::json!({"name": name, "arguments": arguments})))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: i64,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_tool_request_shape() {
        let req = JsonRpcRequest::call_tool("list_directory", serde_json::json!({"path": "/tmp"}));
        assert_eq!(req.method, "tools/call");
        assert_eq!(req.params.unwrap()["name"], "list_directory");
    }

    #[test]
    fn request_ids_are_distinct() {
        let a = JsonRpcRequest::list_tools();
        let b = JsonRpcRequest::list_tools();
        assert_ne!(a.id, b.id);
    }
}
