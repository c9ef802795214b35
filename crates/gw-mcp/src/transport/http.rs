//! HTTP transport: a stateless POST of the JSON-RPC envelope per call
//! (spec §4.7 — "no persistent connection required").

use async_trait::async_trait;
use serde_json::Value;

use super::McpTransport;
use crate::error::McpError;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn call(&self, request: JsonRpcRequest) -> Result<Value, McpError> {
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| McpError::Transport(format!("invalid json-rpc response body: {e}")))?;

        body.into_result().map_err(|e| McpError::JsonRpc { code: e.code, message: e.message })
    }

    async fn disconnect(&self) {}
}
