//! `AppConfig`: the immutable, environment-variable-driven process configuration (spec §6
//! "Configuration" table and §9 "Global mutable state" redesign note — built once at startup
//! by [`crate::load_and_apply`] + [`AppConfig::from_env`], then passed explicitly).

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

/// Parses a comma-separated list of tenant API keys. Each one is a distinct valid caller
/// identity (spec glossary "Owner: the tenant identity derived from the authenticating
/// token") — there is no separate tenant table, the key *is* the tenant.
fn env_api_keys(name: &'static str) -> Result<HashSet<String>, ConfigError> {
    let raw = env_var(name)?;
    let keys: HashSet<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    if keys.is_empty() {
        return Err(ConfigError::Invalid { name, value: raw });
    }
    Ok(keys)
}

fn env_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Process-level configuration, loaded once at startup and never mutated afterward.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Valid tenant API keys (spec §6 "API key"). Each key is itself a distinct tenant
    /// identity — there is no separate tenant table.
    pub api_keys: HashSet<String>,
    /// Backing cache store connection string (e.g. a Redis/moka-fronted URL).
    pub cache_url: String,
    /// Backing durable store connection string (SQLite path or DSN).
    pub durable_url: String,
    /// Admission: maximum accepted request body size, in bytes.
    pub max_request_size_bytes: usize,
    /// Admission: maximum accepted prompt length, in UTF-8 bytes.
    pub max_prompt_length_bytes: usize,
    /// Cache eviction: session cache TTL.
    pub session_cache_ttl: Duration,
    /// Locking: per-session lock lease TTL.
    pub lock_ttl: Duration,
    /// Locking: maximum lock-acquisition retry count before failing.
    pub lock_retry_count: u32,
    /// Locking: base delay for exponential backoff between lock retries.
    pub lock_retry_base_delay: Duration,
    /// Admission: requests allowed per endpoint per minute (a coarse, single shared bucket;
    /// per-route overrides are out of scope per spec §1 "rate limiting").
    pub rate_limit_per_minute: u32,
    /// Whether `X-Forwarded-For` is trusted for client-IP derivation.
    pub trust_proxy_headers: bool,
    /// Source path of the process-wide MCP config file (spec §4.2).
    pub mcp_config_file_path: String,
    /// When true, a malformed MCP config file fails startup instead of logging and continuing
    /// (spec §9 open question #3's "strict-mode flag").
    pub mcp_config_strict: bool,
    /// Auto-deny threshold for unanswered permission requests (spec §4.6).
    pub permission_request_timeout: Duration,
    /// StreamMultiplexer cancel threshold for a blocked slow client (spec §4.7).
    pub slow_client_cutoff: Duration,
    /// Webhook regex evaluation wall-clock budget (spec §4.10 ReDoS guard).
    pub webhook_regex_budget: Duration,
    /// Bound on the events-in-flight queue between AgentRunner and StreamMultiplexer (spec §4.7).
    pub event_queue_capacity: usize,
}

impl AppConfig {
    /// Builds configuration from the current process environment. Call
    /// [`crate::load_and_apply`] first so `.env`/XDG values have already been applied to the
    /// environment (existing env always wins, per that function's contract).
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_keys: env_api_keys("GATEWAY_API_KEYS")?,
            cache_url: env_var("GATEWAY_CACHE_URL").unwrap_or_else(|_| "memory://".to_string()),
            durable_url: env_var("GATEWAY_DURABLE_URL")
                .unwrap_or_else(|_| "sqlite://gateway.db".to_string()),
            max_request_size_bytes: env_or("GATEWAY_MAX_REQUEST_SIZE_BYTES", 1_048_576)?,
            max_prompt_length_bytes: env_or("GATEWAY_MAX_PROMPT_LENGTH_BYTES", 131_072)?,
            session_cache_ttl: Duration::from_secs(env_or("GATEWAY_SESSION_CACHE_TTL_SECS", 3600)?),
            lock_ttl: Duration::from_secs(env_or("GATEWAY_LOCK_TTL_SECS", 30)?),
            lock_retry_count: env_or("GATEWAY_LOCK_RETRY_COUNT", 8)?,
            lock_retry_base_delay: Duration::from_millis(env_or(
                "GATEWAY_LOCK_RETRY_BASE_DELAY_MS",
                50,
            )?),
            rate_limit_per_minute: env_or("GATEWAY_RATE_LIMIT_PER_MINUTE", 600)?,
            trust_proxy_headers: env_or("GATEWAY_TRUST_PROXY_HEADERS", false)?,
            mcp_config_file_path: env_var("GATEWAY_MCP_CONFIG_FILE")
                .unwrap_or_else(|_| "mcp.toml".to_string()),
            mcp_config_strict: env_or("GATEWAY_MCP_CONFIG_STRICT", false)?,
            permission_request_timeout: Duration::from_secs(env_or(
                "GATEWAY_PERMISSION_REQUEST_TIMEOUT_SECS",
                60,
            )?),
            slow_client_cutoff: Duration::from_secs(env_or("GATEWAY_SLOW_CLIENT_CUTOFF_SECS", 30)?),
            webhook_regex_budget: Duration::from_millis(env_or(
                "GATEWAY_WEBHOOK_REGEX_BUDGET_MS",
                50,
            )?),
            event_queue_capacity: env_or("GATEWAY_EVENT_QUEUE_CAPACITY", 32)?,
        })
    }
}
