//! Application state, built once at startup and shared across handlers via
//! axum's `State` extractor — a flat `#[derive(Clone)]`
//! struct of `Arc<...>` fields.

use std::sync::Arc;

use gw_mcp::McpMediator;
use tokio::sync::RwLock;

use crate::accumulator::AccumulatorRegistry;
use crate::cache::ResponseCache;
use crate::dispatch::Dispatcher;
use crate::log_store::LogStore;
use crate::metrics::GatewayMetrics;
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub dispatcher: Arc<Dispatcher>,
    pub mcp: Arc<RwLock<McpMediator>>,
    pub accumulators: Arc<AccumulatorRegistry>,
    pub cache: Arc<ResponseCache>,
    pub log_store: Arc<dyn LogStore>,
    pub metrics: Arc<GatewayMetrics>,
}
