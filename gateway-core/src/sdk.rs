//! The agent SDK boundary. The SDK itself is opaque to the gateway — it is treated as a
//! coroutine that accepts a request and yields wire-shaped [`Event`]s, without the gateway
//! knowing anything about ReAct loops, tool graphs, or model calls underneath.

use async_trait::async_trait;
use gateway_mcp::ServerMap;
use gateway_protocol::Event;
use serde_json::Value;

use crate::error::GatewayError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

/// One query request handed to the SDK to start a run.
#[derive(Clone, Debug)]
pub struct SdkRequest {
    pub session_id: String,
    pub prompt: String,
    pub model: String,
    pub max_turns: Option<u32>,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub permission_mode: PermissionMode,
    pub mcp_servers: ServerMap,
    pub working_directory: Option<String>,
    pub images: Vec<Value>,
    pub agents: Vec<Value>,
}

/// One live SDK-driven run. `AgentRunner` owns exactly one of these for the run's duration.
#[async_trait]
pub trait SdkSession: Send {
    /// Returns the next event, or `None` once the run has nothing further to emit (the
    /// terminal `result`/`error` event is always yielded before this, never in its place).
    async fn next_event(&mut self) -> Option<Event>;

    /// Requests the SDK stop the current turn. Best-effort: the eventual terminal event
    /// still flows through `next_event`.
    async fn interrupt(&mut self);

    /// Forwards a human decision for a pending `permission_request`.
    async fn answer(&mut self, tool_use_id: String, decision: gateway_protocol::PermissionDecision);
}

/// Starts SDK sessions. One implementation per concrete agent SDK; `gateway-core` only
/// depends on this trait, never a specific SDK crate.
#[async_trait]
pub trait AgentSdk: Send + Sync {
    async fn start(&self, request: SdkRequest) -> Result<Box<dyn SdkSession>, GatewayError>;
}
