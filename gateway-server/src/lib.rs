//! HTTP/WS surface for the agent gateway (spec §6): native streaming API under `/api/v1/*`
//! plus an OpenAI-compatible chat completions layer under `/v1/*`, both backed by the same
//! `AgentRunner`/`SessionStore`/`McpStore` machinery.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`].

mod auth;
mod error;
mod interrupt;
mod openai;
mod rate_limit;
mod routes_compat;
mod routes_native;
mod sink;
mod state;
mod webhook;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use gateway_core::AgentSdk;
use gateway_config::AppConfig;
use gateway_mcp::McpConfigLoader;
use gateway_store::{LockConfig, McpStore, SessionStore};

pub use state::AppState;
pub use webhook::{MatcherError, WebhookDispatcher, WebhookHook, WebhookMatcher};

fn sqlite_path(url: &str) -> &str {
    url.strip_prefix("sqlite://").unwrap_or(url)
}

fn build_state(config: AppConfig, sdk: Arc<dyn AgentSdk>, webhooks: Arc<WebhookDispatcher>) -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    let lock_config = LockConfig {
        ttl: config.lock_ttl,
        retry_count: config.lock_retry_count,
        base_delay: config.lock_retry_base_delay,
    };
    let path = sqlite_path(&config.durable_url);
    let sessions = Arc::new(SessionStore::new(path, config.session_cache_ttl, lock_config)?);
    let mcp_store = Arc::new(McpStore::new(path)?);
    let mcp_loader = Arc::new(McpConfigLoader::new(config.mcp_config_file_path.clone()));
    Ok(AppState::new(config, sessions, mcp_store, mcp_loader, sdk, webhooks))
}

/// Assembles the full router: native routes behind [`auth::native_auth`], compat routes behind
/// [`auth::compat_auth`], each with tracing, a body-size cap, and a per-tenant rate limit (spec
/// §6 "Admission"). Auth runs before the rate limiter (added last, so it's outermost) since the
/// limiter keys its buckets on the tenant identity auth resolves.
fn router(state: Arc<AppState>) -> Router {
    let max_body = state.config.max_request_size_bytes;
    let native = routes_native::router()
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit::native))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), auth::native_auth));
    let compat = routes_compat::router()
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit::compat))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), auth::compat_auth));

    Router::new()
        .merge(native)
        .merge(compat)
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the gateway on an existing listener (used by tests: bind to `127.0.0.1:0`, then pass
/// the listener in so the bound port can be read back before serving).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    sdk: Arc<dyn AgentSdk>,
    webhooks: Vec<WebhookHook>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "gateway listening");

    let config = AppConfig::from_env()?;
    let state = build_state(config, sdk, Arc::new(WebhookDispatcher::new(webhooks)))?;
    let app = router(state);

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Runs the gateway, binding `addr` (default `127.0.0.1:8080`).
pub async fn run_serve(
    addr: Option<&str>,
    sdk: Arc<dyn AgentSdk>,
    webhooks: Vec<WebhookHook>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or("127.0.0.1:8080");
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, sdk, webhooks).await
}
