//! MCP client management API (spec §6): `GET /api/mcp/clients`,
//! `POST /api/mcp/client`, `PUT /api/mcp/client/{name}`,
//! `DELETE /api/mcp/client/{name}`, `POST /api/mcp/client/{name}/reconnect`.
//!
//! Connect/disconnect/register/remove take the mediator's writer lease;
//! everything else (dispatch, tool resolution) only ever takes a reader
//! lease (spec §5's MCP reader/writer discipline).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use gw_mcp::{ConnectionState, McpClientConfig, TransportTarget};
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireTransportTarget {
    Stdio { command: String, #[serde(default)] args: Vec<String>, #[serde(default)] env: Vec<(String, String)> },
    Http { url: String },
    Sse { url: String },
}

impl From<WireTransportTarget> for TransportTarget {
    fn from(value: WireTransportTarget) -> Self {
        match value {
            WireTransportTarget::Stdio { command, args, env } => TransportTarget::Stdio { command, args, env },
            WireTransportTarget::Http { url } => TransportTarget::Http { url },
            WireTransportTarget::Sse { url } => TransportTarget::Sse { url },
        }
    }
}

fn target_to_wire(target: &TransportTarget) -> serde_json::Value {
    match target {
        TransportTarget::Stdio { command, args, env } => serde_json::json!({"kind": "stdio", "command": command, "args": args, "env": env}),
        TransportTarget::Http { url } => serde_json::json!({"kind": "http", "url": url}),
        TransportTarget::Sse { url } => serde_json::json!({"kind": "sse", "url": url}),
    }
}

fn state_to_wire(state: &ConnectionState) -> serde_json::Value {
    match state {
        ConnectionState::Configured => serde_json::json!({"state": "configured"}),
        ConnectionState::Connecting => serde_json::json!({"state": "connecting"}),
        ConnectionState::Connected => serde_json::json!({"state": "connected"}),
        ConnectionState::Error(message) => serde_json::json!({"state": "error", "message": message}),
        ConnectionState::Disconnected => serde_json::json!({"state": "disconnected"}),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    pub target: WireTransportTarget,
    #[serde(default)]
    pub tools_to_execute: Vec<String>,
    #[serde(default)]
    pub tools_to_skip: Vec<String>,
    #[serde(default)]
    pub tools_to_auto_execute: Vec<String>,
    #[serde(default)]
    pub is_ping_available: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateToolListsRequest {
    #[serde(default)]
    pub tools_to_execute: Vec<String>,
    #[serde(default)]
    pub tools_to_skip: Vec<String>,
    #[serde(default)]
    pub tools_to_auto_execute: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClientSummary {
    pub name: String,
    pub target: serde_json::Value,
    pub connection: serde_json::Value,
    pub tools: Vec<gw_mcp::McpTool>,
}

/// `GET /api/mcp/clients`.
pub async fn list_clients(State(state): State<AppState>) -> Json<Vec<ClientSummary>> {
    let mediator = state.mcp.read().await;
    let mut summaries = Vec::new();
    for client in mediator.clients() {
        summaries.push(ClientSummary {
            name: client.config.name.clone(),
            target: target_to_wire(&client.config.target),
            connection: state_to_wire(&client.state().await),
            tools: client.discovered_tools().await,
        });
    }
    Json(summaries)
}

/// `POST /api/mcp/client`: register and connect a new client.
pub async fn add_client(State(state): State<AppState>, Json(body): Json<CreateClientRequest>) -> Result<StatusCode, ApiError> {
    let config = McpClientConfig {
        name: body.name,
        target: body.target.into(),
        tools_to_execute: body.tools_to_execute,
        tools_to_skip: body.tools_to_skip,
        tools_to_auto_execute: body.tools_to_auto_execute,
        is_ping_available: body.is_ping_available,
    };

    let mut mediator = state.mcp.write().await;
    let capabilities = mediator.capabilities();
    let client = mediator.register(config);
    if client.connect(capabilities).await.is_ok() {
        client.clone().spawn_exit_monitor(capabilities);
    }
    Ok(StatusCode::CREATED)
}

/// `PUT /api/mcp/client/{name}`: replace tool allow/deny lists in place,
/// preserving the existing transport target.
pub async fn replace_tool_lists(State(state): State<AppState>, Path(name): Path<String>, Json(body): Json<UpdateToolListsRequest>) -> Result<StatusCode, ApiError> {
    let mut mediator = state.mcp.write().await;
    let Some(existing) = mediator.client(&name) else {
        return Ok(StatusCode::NOT_FOUND);
    };
    let mut config = existing.config.clone();
    config.tools_to_execute = body.tools_to_execute;
    config.tools_to_skip = body.tools_to_skip;
    config.tools_to_auto_execute = body.tools_to_auto_execute;

    existing.disconnect().await;
    mediator.remove(&name);
    let capabilities = mediator.capabilities();
    let client = mediator.register(config);
    if client.connect(capabilities).await.is_ok() {
        client.clone().spawn_exit_monitor(capabilities);
    }
    Ok(StatusCode::OK)
}

/// `DELETE /api/mcp/client/{name}`: disconnect and remove.
pub async fn remove_client(State(state): State<AppState>, Path(name): Path<String>) -> StatusCode {
    let mut mediator = state.mcp.write().await;
    match mediator.remove(&name) {
        Some(client) => {
            client.disconnect().await;
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// `POST /api/mcp/client/{name}/reconnect`: force a reconnect without
/// touching its tool-filter config.
pub async fn reconnect_client(State(state): State<AppState>, Path(name): Path<String>) -> StatusCode {
    let mediator = state.mcp.read().await;
    let Some(client) = mediator.client(&name) else {
        return StatusCode::NOT_FOUND;
    };
    let capabilities = mediator.capabilities();
    drop(mediator);
    match client.connect(capabilities).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
