//! stdio transport: spawns a child process and frames JSON-RPC messages as
//! newline-delimited JSON over its stdin/stdout (spec §4.7).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};

use super::McpTransport;
use crate::error::McpError;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<JsonRpcResponse>>>>;

/// A running MCP server child process.
///
/// `is_ping_available` mirrors spec §9's reconnection trigger: when true,
/// the client (not this transport) schedules a liveness probe and restarts
/// the process on exit with exponential backoff.
pub struct StdioTransport {
    child: Mutex<Child>,
    stdin_tx: Mutex<tokio::process::ChildStdin>,
    pending: PendingMap,
}

impl StdioTransport {
    /// Spawn the child and begin reading its stdout in the background.
    /// Returns `Err(McpError::StdioDisabled)` without touching the process
    /// table if `enabled` is false — the `McpCapabilities::stdio_enabled`
    /// gate from spec §9's open-question resolution.
    pub fn spawn(command: &str, args: &[String], env: &[(String, String)], enabled: bool) -> Result<Self, McpError> {
        if !enabled {
            return Err(McpError::StdioDisabled);
        }

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.clone(), v.clone())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::Transport(format!("failed to spawn mcp stdio server: {e}")))?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::Transport("child has no stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::Transport("child has no stdout".into()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        spawn_reader(stdout, pending.clone());

        Ok(Self {
            child: Mutex::new(child),
            stdin_tx: Mutex::new(stdin),
            pending,
        })
    }
}

fn spawn_reader(stdout: tokio::process::ChildStdout, pending: PendingMap) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&line) else {
                        tracing::warn!(line = %line, "mcp stdio: failed to parse response line");
                        continue;
                    };
                    let mut pending = pending.lock().await;
                    if let Some(tx) = pending.remove(&response.id) {
                        let _ = tx.send(response);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "mcp stdio: read error, stopping reader");
                    break;
                }
            }
        }
    });
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn call(&self, request: JsonRpcRequest) -> Result<Value, McpError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request.id, tx);

        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        {
            let mut stdin = self.stdin_tx.lock().await;
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| McpError::Transport(format!("stdin write failed: {e}")))?;
        }

        let response = rx.await.map_err(|_| McpError::Transport("mcp stdio server closed before responding".into()))?;
        response.into_result().map_err(|e| McpError::JsonRpc { code: e.code, message: e.message })
    }

    async fn disconnect(&self) {
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        let _ = child.wait().await;
    }

    async fn has_exited(&self) -> bool {
        self.child.lock().await.try_wait().ok().flatten().is_some()
    }
}
