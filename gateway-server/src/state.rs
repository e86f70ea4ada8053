//! Constructor-wired application state (spec §9 "Dependency-injection containers" redesign
//! note): everything a request handler needs, built once in [`crate::run_serve`] and shared
//! behind an `Arc`, never a global.

use std::sync::Arc;

use gateway_config::AppConfig;
use gateway_core::AgentSdk;
use gateway_mcp::McpConfigLoader;
use gateway_store::{McpStore, SessionStore};

use crate::rate_limit::RateLimiter;
use crate::webhook::WebhookDispatcher;

pub struct AppState {
    pub config: AppConfig,
    pub sessions: Arc<SessionStore>,
    pub mcp_store: Arc<McpStore>,
    pub mcp_loader: Arc<McpConfigLoader>,
    pub sdk: Arc<dyn AgentSdk>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        sessions: Arc<SessionStore>,
        mcp_store: Arc<McpStore>,
        mcp_loader: Arc<McpConfigLoader>,
        sdk: Arc<dyn AgentSdk>,
        webhooks: Arc<WebhookDispatcher>,
    ) -> Arc<Self> {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_minute));
        Arc::new(Self {
            config,
            sessions,
            mcp_store,
            mcp_loader,
            sdk,
            webhooks,
            rate_limiter,
        })
    }
}
