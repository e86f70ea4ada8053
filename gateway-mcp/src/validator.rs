//! `ConfigValidator`: pure functions over an MCP server config entry (spec §4.1).

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use serde::Serialize;

use crate::config::McpServerEntry;

const REDACTED: &str = "[redacted]";

const COMMAND_METACHARACTERS: &[&str] = &[
    ";", "|", "&", "`", "$(", "&&", "||", "\n", "\r", ">", "<",
];

/// Field-name fragments that mark a value as credential-bearing (spec §4.1). Matched against
/// a normalized key (lowercased, `-`/`_` stripped) so `API-Key`, `api_key`, and `apikey` are
/// all recognized without pulling in a regex engine for a fixed, short pattern list.
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "apikey",
    "secret",
    "password",
    "token",
    "credential",
    "bearer",
    "privatekey",
    "dsn",
    "connectionstring",
];

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_lowercase()
}

pub fn is_sensitive_field_name(key: &str) -> bool {
    let normalized = normalize_key(key);
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|frag| normalized.contains(frag))
}

/// What tier a config entry came from; request-tier entries may not carry sensitive values
/// (spec §4.4: "Request-tier entries may not carry sensitive env-var values").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigTier {
    File,
    Tenant,
    Request,
}

impl ConfigTier {
    fn may_carry_credentials(self) -> bool {
        matches!(self, ConfigTier::File | ConfigTier::Tenant)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field_path: String,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    CommandInjection,
    PrivateUrl,
    ForbiddenCredential,
    InvalidUrl,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, field_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            field_path: field_path.into(),
            reason: reason.into(),
        }
    }
}

/// Validates one MCP server config entry against the rules of spec §4.1. `tier` decides
/// whether sensitive-named fields are permitted at all.
pub fn validate(entry: &McpServerEntry, tier: ConfigTier) -> Result<(), ValidationError> {
    if let Some(command) = entry.command() {
        if let Some(bad) = COMMAND_METACHARACTERS.iter().find(|m| command.contains(*m)) {
            return Err(ValidationError::new(
                ValidationErrorKind::CommandInjection,
                "command",
                format!("command contains forbidden metacharacter {bad:?}"),
            ));
        }
    }

    if let Some(url) = entry.url() {
        if url_is_private_or_loopback(url) {
            return Err(ValidationError::new(
                ValidationErrorKind::PrivateUrl,
                "url",
                "url resolves to a private, loopback, or link-local address",
            ));
        }
    }

    if !tier.may_carry_credentials() {
        for (key, _) in entry.string_fields() {
            if is_sensitive_field_name(&key) {
                return Err(ValidationError::new(
                    ValidationErrorKind::ForbiddenCredential,
                    format!("env.{key}"),
                    "this tier may not carry credential-bearing fields",
                ));
            }
        }
    }

    Ok(())
}

/// Classifies a URL's host as private/loopback/link-local per spec §4.1's literal range
/// list (`loopback`, `10.0.0.0/8`, `172.16.0.0/12`, `192.168.0.0/16`, `169.254.0.0/16`, `::1`).
pub fn url_is_private_or_loopback(raw_url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(raw_url) else {
        return true; // fail closed: an unparseable URL is rejected, not allowed through.
    };
    match parsed.host() {
        Some(url::Host::Ipv4(v4)) => ip_is_blocked(IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => ip_is_blocked(IpAddr::V6(v6)),
        // Hostnames that plainly resolve to loopback by convention (no DNS lookup performed
        // here; resolution happens, if at all, at connection time in the opaque SDK).
        Some(url::Host::Domain(domain)) => matches!(domain, "localhost" | "localhost.localdomain"),
        None => true,
    }
}

fn ip_is_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || v6 == Ipv4Addr::UNSPECIFIED.to_ipv6_mapped(),
    }
}

/// Replaces sensitive-named field values with a redaction sentinel, recursing into nested
/// maps (spec §4.1 `sanitize_for_log`).
pub fn sanitize_for_log(entry: &McpServerEntry) -> McpServerEntry {
    match entry.clone() {
        McpServerEntry::Stdio {
            command,
            args,
            env,
            enabled,
        } => McpServerEntry::Stdio {
            command,
            args,
            env: sanitize_map(env),
            enabled,
        },
        McpServerEntry::Sse { url, headers, enabled } => McpServerEntry::Sse {
            url,
            headers: sanitize_map(headers),
            enabled,
        },
        McpServerEntry::Http { url, headers, enabled } => McpServerEntry::Http {
            url,
            headers: sanitize_map(headers),
            enabled,
        },
    }
}

fn sanitize_map(map: BTreeMap<String, String>) -> BTreeMap<String, String> {
    map.into_iter()
        .map(|(k, v)| {
            if is_sensitive_field_name(&k) {
                (k, REDACTED.to_string())
            } else {
                (k, v)
            }
        })
        .collect()
}
