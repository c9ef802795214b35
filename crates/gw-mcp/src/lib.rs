//! # gw-mcp
//!
//! MCP Mediator (C7, spec §4.7): connects to Model Context Protocol servers
//! over stdio/HTTP/SSE, discovers and filters their tools, injects tool
//! schemas into chat/responses requests, and executes tool calls
//! out-of-band on the orchestrator's behalf.
//!
//! Transport framing follows an A2A-style JSON-RPC/SSE binding shape.
//! `rmcp` is this ecosystem's canonical MCP client crate, but the
//! gateway's mediator needs its own tool-filtering and auto-execute
//! semantics (spec §4.7) layered on top, so the wire-level pieces are
//! implemented directly here against the same JSON-RPC envelope `rmcp`
//! itself speaks.

pub mod client;
pub mod error;
pub mod jsonrpc;
pub mod mediator;
pub mod tool_schema;
pub mod transport;

pub use client::{ConnectionState, McpCapabilities, McpClient, McpClientConfig};
pub use error::McpError;
pub use mediator::{McpMediator, ToolExecutionResult, ToolFilterOverrides};
pub use tool_schema::McpTool;
pub use transport::TransportTarget;
