//! MCP server config entry type (spec §3 "MCP Server Config").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One MCP server config entry. Identity `(owner_api_key, name)` lives in the store that
/// holds these, not on the value itself (spec §4.3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum McpServerEntry {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
    Sse {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
}

fn default_enabled() -> bool {
    true
}

impl McpServerEntry {
    pub fn enabled(&self) -> bool {
        match self {
            McpServerEntry::Stdio { enabled, .. } => *enabled,
            McpServerEntry::Sse { enabled, .. } => *enabled,
            McpServerEntry::Http { enabled, .. } => *enabled,
        }
    }

    /// The url field, for transports that carry one (sse/http).
    pub fn url(&self) -> Option<&str> {
        match self {
            McpServerEntry::Stdio { .. } => None,
            McpServerEntry::Sse { url, .. } | McpServerEntry::Http { url, .. } => Some(url),
        }
    }

    /// The command field, for stdio transport.
    pub fn command(&self) -> Option<&str> {
        match self {
            McpServerEntry::Stdio { command, .. } => Some(command),
            _ => None,
        }
    }

    /// All string-valued fields keyed by name, for sensitive-field scanning and redaction
    /// (spec §4.1). Recurses into `env`/`headers` maps.
    pub fn string_fields(&self) -> Vec<(String, String)> {
        match self {
            McpServerEntry::Stdio { env, .. } => {
                env.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            McpServerEntry::Sse { headers, .. } | McpServerEntry::Http { headers, .. } => headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// Map of server name to entry, as produced by each config tier and by the injector.
pub type ServerMap = BTreeMap<String, McpServerEntry>;
