//! MCP server config validation, process-wide loading, and three-tier injection
//! (spec §4.1, §4.2, §4.4). Per-tenant storage (§4.3 `McpStore`) lives in `gateway-store`,
//! which depends on this crate for validation at write time.

pub mod config;
pub mod injector;
pub mod loader;
pub mod validator;

pub use config::{McpServerEntry, ServerMap};
pub use injector::{inject, RequestOverride};
pub use loader::{resolve_env, LoadDiagnostics, McpConfigLoader};
pub use validator::{is_sensitive_field_name, sanitize_for_log, validate, ConfigTier, ValidationError, ValidationErrorKind};
