//! LLM gateway HTTP server: wires configuration, provider worker pools, the
//! plugin pipeline, governance, MCP, and the orchestrator into one axum
//! `Router` (spec §6).

mod accumulator;
mod cache;
mod cancellation;
mod config;
mod dispatch;
mod errors;
mod fallback;
mod handlers;
mod http_client;
mod log_store;
mod metrics;
mod orchestrator;
mod sse;
mod state;
mod wire;
mod worker_pool;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use gw_core::selector::KeySelector;
use gw_governance::{GovernanceGate, InMemoryGovernanceStore};
use gw_mcp::{McpCapabilities, McpMediator};
use gw_plugins::builtin::LoggingPlugin;
use gw_plugins::Pipeline;
use gw_providers::registry::ProviderRegistry;
use tokio::sync::RwLock as AsyncRwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::accumulator::AccumulatorRegistry;
use crate::cache::ResponseCache;
use crate::config::GatewayConfig;
use crate::dispatch::{Dispatcher, ProviderSnapshot};
use crate::http_client::VendorHttpClient;
use crate::log_store::InMemoryLogStore;
use crate::metrics::GatewayMetrics;
use crate::orchestrator::Orchestrator;
use crate::state::AppState;
use crate::worker_pool::{WorkerPool, WorkerPoolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config_path = std::env::var("GATEWAY_CONFIG").unwrap_or_else(|_| "gateway.toml".into());
    let config = match GatewayConfig::load_from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %config_path, "no gateway config found ({e}), starting with an empty provider set");
            GatewayConfig::load_from_str("")?
        }
    };

    let provider_configs = config.build_provider_configs()?;
    let virtual_keys = config.build_virtual_keys();

    let provider_registry = Arc::new(ProviderRegistry::with_builtins());
    let http_client = VendorHttpClient::new();

    let mut pools = WorkerPoolRegistry::new();
    for (name, provider_config) in &provider_configs {
        if provider_registry.get(name).is_none() {
            tracing::warn!(provider = %name, "configured provider has no registered adapter, skipping worker pool");
            continue;
        }
        let performance = provider_config.performance;
        let http = match provider_config.network.proxy.as_deref() {
            Some(proxy) => VendorHttpClient::with_proxy(Some(proxy))?,
            None => http_client.clone(),
        };
        let pool = WorkerPool::spawn(name.clone(), performance, http)?;
        pools.insert(pool);
    }

    let dispatcher = Arc::new(Dispatcher {
        providers: Arc::new(ProviderSnapshot::new(provider_configs)),
        registry: provider_registry,
        pools: Arc::new(pools),
        selector: Arc::new(KeySelector::new()),
    });

    let governance_store = Arc::new(InMemoryGovernanceStore::from_keys(virtual_keys));
    let governance = Arc::new(GovernanceGate::new(governance_store.clone()));

    let mcp_capabilities = McpCapabilities {
        stdio_enabled: std::env::var("GW_MCP_STDIO_ENABLED").map(|v| v == "1" || v == "true").unwrap_or(false),
    };
    let mcp = Arc::new(AsyncRwLock::new(McpMediator::new(mcp_capabilities)));
    mcp.read().await.connect_all().await;

    let pipeline = Arc::new(Pipeline::new(vec![Arc::new(LoggingPlugin) as Arc<dyn gw_plugins::Plugin>]));

    let orchestrator = Arc::new(Orchestrator {
        pipeline,
        governance,
        governance_store,
        mcp: mcp.clone(),
        dispatcher: dispatcher.clone(),
        accumulators: Arc::new(AccumulatorRegistry::new()),
    });

    let state = AppState {
        orchestrator: orchestrator.clone(),
        dispatcher,
        mcp,
        accumulators: orchestrator.accumulators.clone(),
        cache: Arc::new(ResponseCache::new()),
        log_store: Arc::new(InMemoryLogStore::new()),
        metrics: Arc::new(GatewayMetrics::new()),
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let chat_routes = Router::new()
        .route("/v1/chat/completions", post(handlers::chat::chat_completions))
        .route("/v1/text/completions", post(handlers::text::text_completions))
        .route("/v1/audio/speech", post(handlers::audio::speech))
        .route("/v1/audio/transcriptions", post(handlers::audio::transcriptions));

    let app = Router::new()
        .merge(chat_routes.clone())
        // Drop-in compatibility prefixes (spec §6): same wire shape, different
        // path prefix, so they route to the unified handlers unchanged.
        .nest("/openai", chat_routes.clone())
        .nest("/anthropic", chat_routes.clone())
        .nest("/genai", chat_routes)
        .route("/v1/mcp/tool/execute", post(handlers::mcp_tool::execute))
        .route("/api/mcp/clients", get(handlers::mcp_admin::list_clients))
        .route("/api/mcp/client", post(handlers::mcp_admin::add_client))
        .route("/api/mcp/client/:name", put(handlers::mcp_admin::replace_tool_lists).delete(handlers::mcp_admin::remove_client))
        .route("/api/mcp/client/:name/reconnect", post(handlers::mcp_admin::reconnect_client))
        .route("/api/cache/:key", delete(handlers::cache::evict))
        .route("/metrics", get(handlers::metrics::metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.bind_addr.clone().unwrap_or_else(|| std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("llm gateway listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
