//! Parses `--webhook URL=PATTERN` command-line arguments into configured [`WebhookHook`]s.

use std::time::Duration;

use gateway_server::{WebhookHook, WebhookMatcher};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookSpecError {
    #[error("webhook spec {0:?} is missing '=URL=PATTERN'")]
    MissingSeparator(String),
    #[error("webhook matcher for {url:?} rejected: {source}")]
    BadMatcher {
        url: String,
        #[source]
        source: gateway_server::MatcherError,
    },
}

/// Parses one `URL=PATTERN` spec, compiling `PATTERN` with `budget` as its wall-clock guard.
pub fn parse_webhook_spec(spec: &str, budget: Duration) -> Result<WebhookHook, WebhookSpecError> {
    let (url, pattern) = spec
        .split_once('=')
        .ok_or_else(|| WebhookSpecError::MissingSeparator(spec.to_string()))?;
    let matcher = WebhookMatcher::compile(pattern, budget).map_err(|source| WebhookSpecError::BadMatcher {
        url: url.to_string(),
        source,
    })?;
    Ok(WebhookHook {
        matcher,
        url: url.to_string(),
    })
}
