//! One MCP client connection: its config, connection-state machine, and
//! discovered tools (spec §3 "MCP Client Config", §4.7).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::McpError;
use crate::jsonrpc::JsonRpcRequest;
use crate::transport::stdio::StdioTransport;
use crate::transport::{http::HttpTransport, sse::SseTransport, McpTransport, TransportTarget};
use crate::tool_schema::McpTool;

/// `{configured → connecting → connected → (error | disconnected)}`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Configured,
    Connecting,
    Connected,
    Error(String),
    Disconnected,
}

/// Static configuration for one MCP client.
#[derive(Clone, Debug)]
pub struct McpClientConfig {
    pub name: String,
    pub target: TransportTarget,
    pub tools_to_execute: Vec<String>,
    pub tools_to_skip: Vec<String>,
    pub tools_to_auto_execute: Vec<String>,
    pub is_ping_available: bool,
}

/// Gate on stdio client registration (spec §9 Open Question resolution):
/// refuses stdio connections with a clear config error unless explicitly
/// enabled, rather than failing silently inside a sandboxed runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct McpCapabilities {
    pub stdio_enabled: bool,
}

pub struct McpClient {
    pub config: McpClientConfig,
    state: RwLock<ConnectionState>,
    tools: RwLock<Vec<McpTool>>,
    transport: RwLock<Option<Arc<dyn McpTransport>>>,
}

impl McpClient {
    pub fn new(config: McpClientConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ConnectionState::Configured),
            tools: RwLock::new(Vec::new()),
            transport: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    pub async fn discovered_tools(&self) -> Vec<McpTool> {
        self.tools.read().await.clone()
    }

    /// Connect the transport, perform `initialize` then `tools/list`, and
    /// store the discovered tools (spec §4.7).
    pub async fn connect(&self, capabilities: McpCapabilities) -> Result<(), McpError> {
        *self.state.write().await = ConnectionState::Connecting;

        let transport: Arc<dyn McpTransport> = match &self.config.target {
            TransportTarget::Stdio { command, args, env } => {
                match StdioTransport::spawn(command, args, env, capabilities.stdio_enabled) {
                    Ok(t) => Arc::new(t),
                    Err(e) => {
                        *self.state.write().await = ConnectionState::Error(e.to_string());
                        return Err(e);
                    }
                }
            }
            TransportTarget::Http { url } => Arc::new(HttpTransport::new(url.clone())),
            TransportTarget::Sse { url } => Arc::new(SseTransport::connect(url.clone())),
        };

        if let Err(e) = transport.call(JsonRpcRequest::initialize(&self.config.name)).await {
            *self.state.write().await = ConnectionState::Error(e.to_string());
            return Err(e);
        }

        let tools = match transport.call(JsonRpcRequest::list_tools()).await {
            Ok(value) => parse_tools(&value),
            Err(e) => {
                *self.state.write().await = ConnectionState::Error(e.to_string());
                return Err(e);
            }
        };

        *self.tools.write().await = tools;
        *self.transport.write().await = Some(transport);
        *self.state.write().await = ConnectionState::Connected;
        Ok(())
    }

    pub async fn disconnect(&self) {
        if let Some(transport) = self.transport.write().await.take() {
            transport.disconnect().await;
        }
        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Invoke a discovered tool by its unqualified name.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        let transport = self.transport.read().await.clone().ok_or_else(|| McpError::NotConnected(self.config.name.clone()))?;
        transport.call(JsonRpcRequest::call_tool(name, arguments)).await
    }

    /// Names surviving the client-level filter: `tools_to_execute` minus
    /// `tools_to_skip` (spec §4.7). An empty `tools_to_execute` allow-list
    /// means "all discovered tools are candidates".
    pub async fn eligible_tool_names(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        tools
            .iter()
            .map(|t| t.name.clone())
            .filter(|name| self.config.tools_to_execute.is_empty() || self.config.tools_to_execute.contains(name))
            .filter(|name| !self.config.tools_to_skip.contains(name))
            .collect()
    }

    /// Restart the transport after an unexpected child exit, honoring the
    /// spec's 1s→30s capped exponential reconnection schedule. Only
    /// meaningful for stdio clients with `is_ping_available` set.
    pub async fn reconnect_with_backoff(&self, capabilities: McpCapabilities) {
        let mut backoff = Duration::from_secs(1);
        loop {
            tokio::time::sleep(backoff).await;
            if self.connect(capabilities).await.is_ok() {
                return;
            }
            backoff = (backoff * 2).min(Duration::from_secs(30));
        }
    }

    async fn transport_has_exited(&self) -> bool {
        match self.transport.read().await.as_ref() {
            Some(transport) => transport.has_exited().await,
            None => false,
        }
    }

    /// Spawn a background watcher that reconnects the client when its child
    /// process exits unexpectedly (spec §4.7: child exit transitions to
    /// `error` and triggers exponential reconnection if `is_ping_available`
    /// is set). No-op for non-stdio targets or when ping liveness isn't
    /// configured.
    pub fn spawn_exit_monitor(self: Arc<Self>, capabilities: McpCapabilities) {
        if !matches!(self.config.target, TransportTarget::Stdio { .. }) || !self.config.is_ping_available {
            return;
        }
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(2)).await;
                let connected = *self.state.read().await == ConnectionState::Connected;
                if connected && self.transport_has_exited().await {
                    *self.state.write().await = ConnectionState::Error("mcp child process exited".into());
                    self.reconnect_with_backoff(capabilities).await;
                }
            }
        });
    }
}

fn parse_tools(value: &Value) -> Vec<McpTool> {
    value
        .get("tools")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|t| serde_json::from_value(t.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> McpClientConfig {
        McpClientConfig {
            name: name.into(),
            target: TransportTarget::Http { url: "http://localhost/mcp".into() },
            tools_to_execute: vec![],
            tools_to_skip: vec![],
            tools_to_auto_execute: vec![],
            is_ping_available: false,
        }
    }

    #[tokio::test]
    async fn starts_in_configured_state() {
        let client = McpClient::new(config("fs"));
        assert_eq!(client.state().await, ConnectionState::Configured);
    }

    #[tokio::test]
    async fn eligible_tools_respects_skip_list() {
        let mut cfg = config("fs");
        cfg.tools_to_skip = vec!["delete_file".into()];
        let client = McpClient::new(cfg);
        *client.tools.write().await = vec![
            McpTool { name: "list_directory".into(), description: String::new(), input_schema: serde_json::json!({}) },
            McpTool { name: "delete_file".into(), description: String::new(), input_schema: serde_json::json!({}) },
        ];
        let eligible = client.eligible_tool_names().await;
        assert_eq!(eligible, vec!["list_directory".to_string()]);
    }
}
