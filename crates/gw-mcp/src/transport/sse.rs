//! SSE transport: a long-lived event stream for server→client JSON-RPC
//! traffic, with request POSTs sent to a side endpoint the server
//! advertises on connect — the legacy MCP HTTP+SSE binding.
//!
//! The backoff schedule follows spec §9's MCP reconnection note (1s → 30s
//! capped, doubling).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex, Notify};

use super::McpTransport;
use crate::error::McpError;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<JsonRpcResponse>>>>;

pub struct SseTransport {
    client: reqwest::Client,
    post_endpoint: Arc<Mutex<Option<String>>>,
    endpoint_ready: Arc<Notify>,
    pending: PendingMap,
    shutdown: Arc<Notify>,
}

impl SseTransport {
    pub fn connect(stream_url: impl Into<String>) -> Self {
        let client = reqwest::Client::new();
        let post_endpoint = Arc::new(Mutex::new(None));
        let endpoint_ready = Arc::new(Notify::new());
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = Arc::new(Notify::new());

        spawn_event_loop(
            client.clone(),
            stream_url.into(),
            post_endpoint.clone(),
            endpoint_ready.clone(),
            pending.clone(),
            shutdown.clone(),
        );

        Self {
            client,
            post_endpoint,
            endpoint_ready,
            pending,
            shutdown,
        }
    }

    async fn wait_for_endpoint(&self) -> String {
        loop {
            if let Some(url) = self.post_endpoint.lock().await.clone() {
                return url;
            }
            self.endpoint_ready.notified().await;
        }
    }
}

fn spawn_event_loop(
    client: reqwest::Client,
    stream_url: String,
    post_endpoint: Arc<Mutex<Option<String>>>,
    endpoint_ready: Arc<Notify>,
    pending: PendingMap,
    shutdown: Arc<Notify>,
) {
    tokio::spawn(async move {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let mut source = match client.get(&stream_url).eventsource() {
                Ok(source) => source,
                Err(e) => {
                    tracing::warn!(error = %e, "mcp sse: failed to open event source");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            let mut connected_once = false;
            loop {
                tokio::select! {
                    _ = shutdown.notified() => return,
                    next = source.next() => {
                        match next {
                            Some(Ok(Event::Open)) => {
                                connected_once = true;
                                backoff = INITIAL_BACKOFF;
                            }
                            Some(Ok(Event::Message(msg))) => {
                                handle_event(&msg.event, &msg.data, &post_endpoint, &endpoint_ready, &pending).await;
                            }
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "mcp sse: stream error, reconnecting");
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }

            if !connected_once {
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            tokio::time::sleep(backoff).await;
        }
    });
}

async fn handle_event(
    event: &str,
    data: &str,
    post_endpoint: &Arc<Mutex<Option<String>>>,
    endpoint_ready: &Arc<Notify>,
    pending: &PendingMap,
) {
    match event {
        "endpoint" => {
            *post_endpoint.lock().await = Some(data.to_string());
            endpoint_ready.notify_waiters();
        }
        "message" | "" => {
            let Ok(response) = serde_json::from_str::<JsonRpcResponse>(data) else {
                tracing::warn!(data = %data, "mcp sse: failed to parse message event");
                return;
            };
            if let Some(tx) = pending.lock().await.remove(&response.id) {
                let _ = tx.send(response);
            }
        }
        other => tracing::debug!(event = %other, "mcp sse: ignoring unknown event type"),
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn call(&self, request: JsonRpcRequest) -> Result<Value, McpError> {
        let endpoint = tokio::time::timeout(Duration::from_secs(10), self.wait_for_endpoint())
            .await
            .map_err(|_| McpError::Timeout(Duration::from_secs(10)))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request.id, tx);

        self.client
            .post(&endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let response = tokio::time::timeout(Duration::from_secs(60), rx)
            .await
            .map_err(|_| McpError::Timeout(Duration::from_secs(60)))?
            .map_err(|_| McpError::Transport("mcp sse transport closed before responding".into()))?;

        response.into_result().map_err(|e| McpError::JsonRpc { code: e.code, message: e.message })
    }

    async fn disconnect(&self) {
        self.shutdown.notify_waiters();
    }
}
