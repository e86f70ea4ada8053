//! Operator CLI support library: run the gateway server, inspect and validate MCP server
//! configs from the command line (spec §1 "CLI tooling" — an external collaborator, not part
//! of the gateway's own contract).

pub mod logging;
pub mod mcp_admin;
pub mod webhook_spec;

pub use mcp_admin::{default_mcp_config_path, load_and_validate, sanitized, ServerReport};
pub use webhook_spec::parse_webhook_spec;
