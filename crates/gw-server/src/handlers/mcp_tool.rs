//! `POST /v1/mcp/tool/execute` (spec §6): accepts a tool-call block,
//! returns a tool-result block, bypassing the orchestrator entirely (this
//! is a direct execution endpoint, not a chat turn).

use axum::extract::State;
use axum::Json;
use gw_core::message::ToolCall;
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ToolExecuteRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub struct ToolExecuteResponse {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

pub async fn execute(State(state): State<AppState>, Json(body): Json<ToolExecuteRequest>) -> Result<Json<ToolExecuteResponse>, ApiError> {
    let call = ToolCall { id: body.id, name: body.name, arguments: body.arguments };
    let mcp = state.mcp.read().await;
    let result = mcp.execute_tool_call(&call).await;
    Ok(Json(ToolExecuteResponse {
        tool_call_id: result.tool_call_id,
        content: result.content,
        is_error: result.is_error,
    }))
}
