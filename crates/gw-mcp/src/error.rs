//! MCP-specific error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("mcp transport error: {0}")]
    Transport(String),

    #[error("mcp client {0} is not connected")]
    NotConnected(String),

    #[error("mcp client not found: {0}")]
    UnknownClient(String),

    #[error("mcp tool not found: {0}")]
    UnknownTool(String),

    #[error("mcp json-rpc error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    #[error("mcp serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stdio transport is disabled by McpCapabilities")]
    StdioDisabled,

    #[error("mcp tool call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<&McpError> for gw_core::GatewayError {
    fn from(err: &McpError) -> Self {
        match err {
            McpError::StdioDisabled => {
                gw_core::GatewayError::validation(err.to_string())
            }
            McpError::Timeout(_) => {
                gw_core::GatewayError::new(gw_core::error::ErrorKind::UpstreamTimeout, err.to_string())
            }
            _ => gw_core::GatewayError::internal(err.to_string()),
        }
    }
}
