//! `mcp` subcommand support: load the process-wide MCP config file, validate every entry the
//! way the gateway would at startup, and render sanitized reports for an operator.

use gateway_mcp::{sanitize_for_log, validate, ConfigTier, LoadDiagnostics, McpConfigLoader, McpServerEntry, ValidationError};

pub fn default_mcp_config_path() -> String {
    std::env::var("GATEWAY_MCP_CONFIG_FILE").unwrap_or_else(|_| "mcp.toml".to_string())
}

/// One loaded server entry plus the validation outcome the gateway would apply to it at
/// startup (spec §4.1 "ConfigValidator", file tier).
pub struct ServerReport {
    pub name: String,
    pub entry: McpServerEntry,
    pub violation: Option<ValidationError>,
}

/// Loads `path` as a process-wide MCP config file and validates every entry. Mirrors what
/// `McpConfigLoader` does at gateway startup, without requiring the rest of `AppConfig`.
pub fn load_and_validate(path: &str) -> (Vec<ServerReport>, LoadDiagnostics) {
    let loader = McpConfigLoader::new(path);
    let (servers, diagnostics) = loader.load();
    let reports = servers
        .into_iter()
        .map(|(name, entry)| {
            let violation = validate(&entry, ConfigTier::File).err();
            ServerReport { name, entry, violation }
        })
        .collect();
    (reports, diagnostics)
}

/// A report entry with its credential-bearing fields redacted, safe to print.
pub fn sanitized(report: &ServerReport) -> McpServerEntry {
    sanitize_for_log(&report.entry)
}
