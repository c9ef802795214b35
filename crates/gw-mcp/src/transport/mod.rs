//! Transport bindings for MCP client connections (spec §4.7): stdio, HTTP,
//! and SSE, sharing the JSON-RPC envelope in [`crate::jsonrpc`].

pub mod http;
pub mod sse;
pub mod stdio;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::McpError;
use crate::jsonrpc::JsonRpcRequest;

/// A connected transport capable of exchanging one JSON-RPC request for one
/// response. Each transport owns its own connection lifecycle; the
/// [`crate::client::McpClient`] state machine only calls `call` and
/// `disconnect`.
#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn call(&self, request: JsonRpcRequest) -> Result<Value, McpError>;

    async fn disconnect(&self);

    /// Whether the underlying connection has died on its own (spec §4.7's
    /// reconnection trigger). Only stdio's child process can tell; other
    /// transports report `false` and rely on `call` errors instead.
    async fn has_exited(&self) -> bool {
        false
    }
}

/// Declared MCP connection target (spec §3 MCP Client Config).
#[derive(Clone, Debug)]
pub enum TransportTarget {
    Stdio {
        command: String,
        args: Vec<String>,
        env: Vec<(String, String)>,
    },
    Http {
        url: String,
    },
    Sse {
        url: String,
    },
}
