//! The MCP Mediator (C7): tool filtering, request rewriting, and
//! out-of-band tool execution (spec §4.7).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gw_core::message::ToolCall;
use gw_core::request::{RequestPayload, ToolSchema};
use gw_core::{Message, Request, VirtualKey};
use serde_json::Value;

use crate::client::{McpCapabilities, McpClient, McpClientConfig};
use crate::error::McpError;
use crate::tool_schema::split_qualified_name;

/// Request-scoped filter overrides: the `mcp-include-tools` /
/// `mcp-exclude-tools` / `mcp-include-clients` / `mcp-exclude-clients`
/// headers from spec §4.7.
#[derive(Clone, Debug, Default)]
pub struct ToolFilterOverrides {
    pub include_tools: Vec<String>,
    pub exclude_tools: Vec<String>,
    pub include_clients: Vec<String>,
    pub exclude_clients: Vec<String>,
}

/// The result of executing one tool call out-of-band. Failures are
/// normalized into the `error` field rather than propagated as a
/// transport exception (spec §4.7: "Failures surface as a tool result
/// whose body encodes the error, not as a transport exception").
#[derive(Clone, Debug)]
pub struct ToolExecutionResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

pub struct McpMediator {
    clients: HashMap<String, Arc<McpClient>>,
    capabilities: McpCapabilities,
    call_timeout: Duration,
}

impl McpMediator {
    pub fn new(capabilities: McpCapabilities) -> Self {
        Self {
            clients: HashMap::new(),
            capabilities,
            call_timeout: Duration::from_secs(30),
        }
    }

    pub fn register(&mut self, config: McpClientConfig) -> Arc<McpClient> {
        let client = Arc::new(McpClient::new(config.clone()));
        self.clients.insert(config.name.clone(), client.clone());
        client
    }

    pub fn capabilities(&self) -> McpCapabilities {
        self.capabilities
    }

    pub fn client(&self, name: &str) -> Option<Arc<McpClient>> {
        self.clients.get(name).cloned()
    }

    /// Remove a client's registration (spec §6 `DELETE /api/mcp/client/{name}`
    /// and the replace-in-place step of the `PUT` handler). Does not
    /// disconnect the transport; callers hold the client long enough to do
    /// that first.
    pub fn remove(&mut self, name: &str) -> Option<Arc<McpClient>> {
        self.clients.remove(name)
    }

    pub fn clients(&self) -> impl Iterator<Item = &Arc<McpClient>> {
        self.clients.values()
    }

    /// Connect every configured client. Individual connection failures are
    /// logged and leave that client in its `error` state rather than
    /// aborting startup for the others.
    pub async fn connect_all(&self) {
        for client in self.clients.values() {
            if let Err(e) = client.connect(self.capabilities).await {
                tracing::warn!(client = %client.config.name, error = %e, "mcp client failed to connect");
            } else {
                client.clone().spawn_exit_monitor(self.capabilities);
            }
        }
    }

    /// Names of clients eligible for this request, after applying (a) the
    /// virtual key's allow-list and (b) request-scoped include/exclude
    /// overrides (spec §4.7).
    fn eligible_client_names(&self, virtual_key: Option<&VirtualKey>, overrides: &ToolFilterOverrides) -> Vec<String> {
        self.clients
            .keys()
            .filter(|name| {
                match virtual_key.and_then(|vk| vk.mcp_client_allow_list.as_ref()) {
                    Some(allow) => allow.contains(name),
                    None => true,
                }
            })
            .filter(|name| overrides.include_clients.is_empty() || overrides.include_clients.contains(name))
            .filter(|name| !overrides.exclude_clients.contains(name))
            .cloned()
            .collect()
    }

    /// Resolve the set of tool schemas to inject into a request: the
    /// intersection described in spec §4.7, across every eligible client.
    pub async fn resolve_tool_schemas(
        &self,
        virtual_key: Option<&VirtualKey>,
        overrides: &ToolFilterOverrides,
    ) -> Vec<ToolSchema> {
        let mut schemas = Vec::new();
        for name in self.eligible_client_names(virtual_key, overrides) {
            let Some(client) = self.clients.get(&name) else { continue };
            let eligible_names = client.eligible_tool_names().await;
            for tool in client.discovered_tools().await {
                if !eligible_names.contains(&tool.name) {
                    continue;
                }
                if !overrides.include_tools.is_empty() && !overrides.include_tools.contains(&tool.name) {
                    continue;
                }
                if overrides.exclude_tools.contains(&tool.name) {
                    continue;
                }
                schemas.push(tool.to_tool_schema(&name));
            }
        }
        schemas
    }

    /// Merge the resolved tool schemas into a chat/responses request's
    /// existing tool list (merge, not replace — spec §4.7).
    pub async fn inject_tools(
        &self,
        request: &Request,
        virtual_key: Option<&VirtualKey>,
        overrides: &ToolFilterOverrides,
    ) -> Request {
        if !request.payload.is_chat_like() {
            return request.clone();
        }
        let injected = self.resolve_tool_schemas(virtual_key, overrides).await;
        if injected.is_empty() {
            return request.clone();
        }
        let mut rewritten = request.clone();
        rewritten.common.tools.extend(injected);
        rewritten
    }

    /// Execute one upstream-requested tool call against its owning MCP
    /// client, given its qualified name (`{client}__{tool}`).
    pub async fn execute_tool_call(&self, call: &ToolCall) -> ToolExecutionResult {
        let Some((client_name, tool_name)) = split_qualified_name(&call.name) else {
            return ToolExecutionResult {
                tool_call_id: call.id.clone(),
                content: format!("unrecognized tool name: {}", call.name),
                is_error: true,
            };
        };

        let Some(client) = self.clients.get(client_name) else {
            return ToolExecutionResult {
                tool_call_id: call.id.clone(),
                content: format!("unknown mcp client: {client_name}"),
                is_error: true,
            };
        };

        let arguments: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
        match tokio::time::timeout(self.call_timeout, client.call_tool(tool_name, arguments)).await {
            Ok(Ok(result)) => ToolExecutionResult {
                tool_call_id: call.id.clone(),
                content: result.to_string(),
                is_error: false,
            },
            Ok(Err(e)) => ToolExecutionResult {
                tool_call_id: call.id.clone(),
                content: e.to_string(),
                is_error: true,
            },
            Err(_) => ToolExecutionResult {
                tool_call_id: call.id.clone(),
                content: format!("tool call timed out after {:?}", self.call_timeout),
                is_error: true,
            },
        }
    }

    /// Whether a tool call resolved by this mediator is flagged for
    /// orchestrator auto-execution (spec §4.7 path (a)).
    pub fn is_auto_executable(&self, call: &ToolCall) -> bool {
        let Some((client_name, tool_name)) = split_qualified_name(&call.name) else {
            return false;
        };
        self.clients
            .get(client_name)
            .is_some_and(|c| c.config.tools_to_auto_execute.iter().any(|t| t == tool_name))
    }
}

/// Turn a batch of tool execution results into tool-result messages to
/// append for the next upstream turn (spec §4.7 auto-execute loop-back).
pub fn to_tool_messages(results: &[ToolExecutionResult]) -> Vec<Message> {
    results
        .iter()
        .map(|r| Message::tool_result(r.content.clone(), r.tool_call_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportTarget;

    fn mediator_with_client(name: &str) -> McpMediator {
        let mut mediator = McpMediator::new(McpCapabilities { stdio_enabled: false });
        mediator.register(McpClientConfig {
            name: name.into(),
            target: TransportTarget::Http { url: "http://localhost/mcp".into() },
            tools_to_execute: vec![],
            tools_to_skip: vec![],
            tools_to_auto_execute: vec!["list_directory".into()],
            is_ping_available: false,
        });
        mediator
    }

    #[test]
    fn unqualified_tool_name_is_execution_error() {
        let mediator = mediator_with_client("fs");
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(mediator.execute_tool_call(&ToolCall {
            id: "call_1".into(),
            name: "not_qualified".into(),
            arguments: "{}".into(),
        }));
        assert!(result.is_error);
    }

    #[test]
    fn auto_execute_flag_respects_per_client_list() {
        let mediator = mediator_with_client("fs");
        let call = ToolCall {
            id: "call_1".into(),
            name: "fs__list_directory".into(),
            arguments: "{}".into(),
        };
        assert!(mediator.is_auto_executable(&call));

        let other = ToolCall {
            id: "call_2".into(),
            name: "fs__delete_file".into(),
            arguments: "{}".into(),
        };
        assert!(!mediator.is_auto_executable(&other));
    }

    #[tokio::test]
    async fn virtual_key_allow_list_restricts_eligible_clients() {
        let mediator = mediator_with_client("fs");
        let mut vk = VirtualKey::new("vk1", "test");
        vk.mcp_client_allow_list = Some(vec!["other".into()]);
        let overrides = ToolFilterOverrides::default();
        let names = mediator.eligible_client_names(Some(&vk), &overrides);
        assert!(names.is_empty());
    }
}
