//! `McpInjector`: merges file/tenant/request tiers into one server map (spec §4.4).

use crate::config::ServerMap;
use crate::validator::{sanitize_for_log, validate, ConfigTier};

/// The request-tier override, as carried on a single query (spec §3: `mcp_servers?: map | {} | null`).
#[derive(Clone, Debug, Default)]
pub enum RequestOverride {
    #[default]
    Unset,
    /// Explicit `{}` — disables all MCP servers for this request.
    EmptyMap,
    Explicit(ServerMap),
}

/// Resolves the three-tier precedence (file ← tenant ← request) into one server map ready
/// to hand to the agent SDK. Each tier is validated independently; invalid entries are
/// dropped (never block the whole merge) and logged through the sanitizer.
pub fn inject(file_map: &ServerMap, tenant_map: &ServerMap, request: &RequestOverride) -> ServerMap {
    match request {
        RequestOverride::EmptyMap => ServerMap::new(),
        RequestOverride::Explicit(overrides) => validate_tier(overrides, ConfigTier::Request),
        RequestOverride::Unset => {
            let mut merged = validate_tier(file_map, ConfigTier::File);
            merged.extend(validate_tier(tenant_map, ConfigTier::Tenant));
            merged
        }
    }
}

fn validate_tier(map: &ServerMap, tier: ConfigTier) -> ServerMap {
    map.iter()
        .filter_map(|(name, entry)| match validate(entry, tier) {
            Ok(()) => Some((name.clone(), entry.clone())),
            Err(err) => {
                let sanitized = sanitize_for_log(entry);
                tracing::warn!(
                    server = %name,
                    tier = ?tier,
                    kind = ?err.kind,
                    field_path = %err.field_path,
                    entry = ?sanitized,
                    "dropping invalid MCP server config entry"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McpServerEntry;
    use std::collections::BTreeMap;

    fn stdio(command: &str) -> McpServerEntry {
        McpServerEntry::Stdio {
            command: command.to_string(),
            args: vec![],
            env: BTreeMap::new(),
            enabled: true,
        }
    }

    #[test]
    fn request_empty_map_disables_everything() {
        let mut file_map = ServerMap::new();
        file_map.insert("github".into(), stdio("npx"));
        let result = inject(&file_map, &ServerMap::new(), &RequestOverride::EmptyMap);
        assert!(result.is_empty());
    }

    #[test]
    fn tenant_replaces_file_entry_of_same_name() {
        let mut file_map = ServerMap::new();
        file_map.insert("github".into(), stdio("file-cmd"));
        let mut tenant_map = ServerMap::new();
        tenant_map.insert("github".into(), stdio("tenant-cmd"));
        let result = inject(&file_map, &tenant_map, &RequestOverride::Unset);
        assert_eq!(result["github"].command(), Some("tenant-cmd"));
    }

    #[test]
    fn request_override_replaces_all_server_side_tiers() {
        let mut file_map = ServerMap::new();
        file_map.insert("github".into(), stdio("file-cmd"));
        let mut tenant_map = ServerMap::new();
        tenant_map.insert("github".into(), stdio("tenant-cmd"));
        let mut overrides = ServerMap::new();
        overrides.insert("github".into(), stdio("request-cmd"));
        let result = inject(
            &file_map,
            &tenant_map,
            &RequestOverride::Explicit(overrides),
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result["github"].command(), Some("request-cmd"));
    }

    #[test]
    fn invalid_entry_is_dropped_not_fatal() {
        let mut file_map = ServerMap::new();
        file_map.insert("good".into(), stdio("npx"));
        file_map.insert("bad".into(), stdio("rm -rf /; echo pwned"));
        let result = inject(&file_map, &ServerMap::new(), &RequestOverride::Unset);
        assert!(result.contains_key("good"));
        assert!(!result.contains_key("bad"));
    }

    #[test]
    fn request_tier_entry_with_sensitive_env_is_dropped() {
        let mut env = BTreeMap::new();
        env.insert("API_KEY".into(), "sk-abc".into());
        let mut overrides = ServerMap::new();
        overrides.insert(
            "github".into(),
            McpServerEntry::Stdio {
                command: "npx".into(),
                args: vec![],
                env,
                enabled: true,
            },
        );
        let result = inject(
            &ServerMap::new(),
            &ServerMap::new(),
            &RequestOverride::Explicit(overrides),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn unset_merges_file_and_tenant() {
        let mut file_map = ServerMap::new();
        file_map.insert("a".into(), stdio("a-cmd"));
        let mut tenant_map = ServerMap::new();
        tenant_map.insert("b".into(), stdio("b-cmd"));
        let result = inject(&file_map, &tenant_map, &RequestOverride::Unset);
        assert_eq!(result.len(), 2);
    }
}
