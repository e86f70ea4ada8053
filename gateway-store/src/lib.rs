//! Durable and cached persistence for the agent gateway: sessions with a distributed
//! per-session lock (spec §4.5), and per-tenant MCP server configs with share tokens (§4.3).

mod error;
mod mcp_store;
mod session;

pub use error::{StoreError, StoreResult};
pub use mcp_store::McpStore;
pub use session::{
    Checkpoint, LockConfig, Session, SessionFilters, SessionMode, SessionPatch, SessionStatus,
    SessionStore,
};
