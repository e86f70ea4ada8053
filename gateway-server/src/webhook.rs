//! Rate-limited, ReDoS-safe webhook matchers (spec §4.10). A hook's `matcher` regex is applied
//! to tool names; catastrophic patterns are rejected at configuration time, and every
//! evaluation carries a hard wall-clock budget, failing closed (never "match") either way.

use std::time::Duration;

use regex::Regex;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MatcherError {
    #[error("matcher pattern rejected by complexity check: {0}")]
    TooComplex(String),
    #[error("matcher pattern failed to compile: {0}")]
    CompileFailed(String),
}

/// A compiled, complexity-checked webhook matcher with a per-evaluation time budget.
#[derive(Debug)]
pub struct WebhookMatcher {
    pattern: String,
    regex: Regex,
    budget: Duration,
}

impl WebhookMatcher {
    pub fn compile(pattern: &str, budget: Duration) -> Result<Self, MatcherError> {
        if let Some(reason) = complexity_violation(pattern) {
            return Err(MatcherError::TooComplex(reason));
        }
        let regex = Regex::new(pattern).map_err(|e| MatcherError::CompileFailed(e.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            budget,
        })
    }

    /// Evaluates the matcher against `input`. Exceeding the budget is treated as "no match"
    /// and logged as a diagnostic; it is never treated as a match (fail-closed).
    pub async fn matches(&self, input: &str) -> bool {
        let regex = self.regex.clone();
        let input = input.to_string();
        let pattern = self.pattern.clone();
        let task = tokio::task::spawn_blocking(move || regex.is_match(&input));
        match tokio::time::timeout(self.budget, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                tracing::warn!(pattern = %pattern, error = %join_err, "webhook matcher task panicked; treating as no match");
                false
            }
            Err(_) => {
                tracing::warn!(pattern = %pattern, budget_ms = self.budget.as_millis(), "webhook matcher exceeded budget; treating as no match");
                false
            }
        }
    }
}

/// Static rejection heuristics for catastrophic backtracking shapes: a quantified group
/// immediately re-quantified (`(a+)+`), and alternation branches that are textually identical
/// duplicates within the same group (`(a|a)*`).
fn complexity_violation(pattern: &str) -> Option<String> {
    let nested_quantifier = Regex::new(r"\([^()]*[+*][^()]*\)[+*{]").unwrap();
    if nested_quantifier.is_match(pattern) {
        return Some("nested quantifier on the same subexpression".to_string());
    }

    let alternation_group = Regex::new(r"\(([^()]*\|[^()]*)\)").unwrap();
    for caps in alternation_group.captures_iter(pattern) {
        let mut seen = std::collections::HashSet::new();
        for alt in caps[1].split('|') {
            if !seen.insert(alt) {
                return Some(format!("duplicate alternation branch {alt:?}"));
            }
        }
    }
    None
}

/// One configured webhook: fires its `url` with the triggering tool name whenever `matcher`
/// matches (spec §2 "WebhookDispatcher": invokes user webhooks on tool events).
#[derive(Debug)]
pub struct WebhookHook {
    pub matcher: WebhookMatcher,
    pub url: String,
}

/// Fires configured hooks on tool events. Delivery is fire-and-forget: a slow or failing
/// endpoint must never block the session's event stream, so every POST is spawned and its
/// outcome only logged.
pub struct WebhookDispatcher {
    hooks: Vec<WebhookHook>,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(hooks: Vec<WebhookHook>) -> Self {
        Self {
            hooks,
            client: reqwest::Client::new(),
        }
    }

    /// Checks `tool_name` against every configured hook and spawns a delivery for each match.
    pub async fn dispatch(&self, session_id: &str, tool_name: &str) {
        for hook in &self.hooks {
            if hook.matcher.matches(tool_name).await {
                let client = self.client.clone();
                let url = hook.url.clone();
                let session_id = session_id.to_string();
                let tool_name = tool_name.to_string();
                tokio::spawn(async move {
                    let body = serde_json::json!({ "session_id": session_id, "tool_name": tool_name });
                    if let Err(err) = client.post(&url).json(&body).send().await {
                        tracing::warn!(url = %url, error = %err, "webhook delivery failed");
                    }
                });
            }
        }
    }
}
