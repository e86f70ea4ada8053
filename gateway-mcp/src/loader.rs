//! `McpConfigLoader`: process-wide MCP config file (spec §4.2).

use std::sync::OnceLock;

use crate::config::{McpServerEntry, ServerMap};

#[derive(Clone, Debug, Default)]
pub struct LoadDiagnostics {
    pub parse_failed: bool,
    pub unresolved_placeholders: Vec<String>,
}

#[derive(serde::Deserialize)]
struct FileFormat {
    #[serde(default)]
    mcp_servers: ServerMap,
}

/// Loads the process-wide MCP config file once per process start and caches the result
/// (spec §4.2: "Parses once per process start; subsequent calls return cached result").
pub struct McpConfigLoader {
    path: String,
    cache: OnceLock<(ServerMap, LoadDiagnostics)>,
}

impl McpConfigLoader {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cache: OnceLock::new(),
        }
    }

    /// Returns the cached (or freshly parsed) file-tier server map. On parse error, returns
    /// an empty map and records the failure in diagnostics rather than propagating — the spec's
    /// stated default behavior (§9 open question #3), overridable by `strict` at the call site.
    pub fn load(&self) -> (ServerMap, LoadDiagnostics) {
        self.cache
            .get_or_init(|| {
                let raw = match std::fs::read_to_string(&self.path) {
                    Ok(raw) => raw,
                    Err(_) => return (ServerMap::default(), LoadDiagnostics::default()),
                };
                match toml::from_str::<FileFormat>(&raw) {
                    Ok(parsed) => {
                        let mut diagnostics = LoadDiagnostics::default();
                        let resolved = parsed
                            .mcp_servers
                            .into_iter()
                            .map(|(name, entry)| {
                                let (entry, mut placeholders) = resolve_env(entry);
                                diagnostics.unresolved_placeholders.append(&mut placeholders);
                                (name, entry)
                            })
                            .collect();
                        (resolved, diagnostics)
                    }
                    Err(e) => {
                        tracing::error!(path = %self.path, error = %e, "failed to parse MCP config file");
                        (
                            ServerMap::default(),
                            LoadDiagnostics {
                                parse_failed: true,
                                unresolved_placeholders: Vec::new(),
                            },
                        )
                    }
                }
            })
            .clone()
    }
}

/// Recursively substitutes `${NAME}` (NAME matching `^[A-Z_][A-Z0-9_]*$`) in string fields
/// with the host process environment variable of the same name (spec §4.2). Unmatched
/// placeholders are left as-is and counted, never failed.
pub fn resolve_env(entry: McpServerEntry) -> (McpServerEntry, Vec<String>) {
    let mut unresolved = Vec::new();
    let entry = match entry {
        McpServerEntry::Stdio {
            command,
            args,
            env,
            enabled,
        } => McpServerEntry::Stdio {
            command: resolve_str(&command, &mut unresolved),
            args: args.iter().map(|a| resolve_str(a, &mut unresolved)).collect(),
            env: env
                .into_iter()
                .map(|(k, v)| (k, resolve_str(&v, &mut unresolved)))
                .collect(),
            enabled,
        },
        McpServerEntry::Sse { url, headers, enabled } => McpServerEntry::Sse {
            url: resolve_str(&url, &mut unresolved),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k, resolve_str(&v, &mut unresolved)))
                .collect(),
            enabled,
        },
        McpServerEntry::Http { url, headers, enabled } => McpServerEntry::Http {
            url: resolve_str(&url, &mut unresolved),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k, resolve_str(&v, &mut unresolved)))
                .collect(),
            enabled,
        },
    };
    (entry, unresolved)
}

fn is_valid_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn resolve_str(input: &str, unresolved: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let rest = &input[i..];
        if let Some(after_brace) = rest.strip_prefix("${") {
            if let Some(end) = after_brace.find('}') {
                let name = &after_brace[..end];
                if is_valid_var_name(name) {
                    match std::env::var(name) {
                        Ok(value) => {
                            out.push_str(&value);
                            i += 2 + end + 1;
                            continue;
                        }
                        Err(_) => {
                            unresolved.push(name.to_string());
                        }
                    }
                }
            }
        }
        let c = rest.chars().next().expect("i < input.len() guarantees a char remains");
        out.push(c);
        i += c.len_utf8();
    }
    out
}
