//! Tenant authentication (spec §6 "Auth"): every request carries `X-API-Key`; the
//! compatibility namespace additionally accepts `Authorization: Bearer <t>`. The tenant's
//! identity *is* its token — there is no separate owner lookup.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::error::{authentication, CompatError, NativeError};
use crate::state::AppState;

/// The authenticated tenant identity, attached to request extensions by the auth middleware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner(pub String);

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let mut parts = raw.splitn(2, ' ');
    let scheme = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    parts.next().map(|t| t.trim().to_string())
}

/// Resolves the caller-presented token. `X-API-Key` always wins; the bearer shim only applies
/// when `allow_bearer_shim` is set (the compatibility namespace) and never overwrites an
/// explicit `X-API-Key` (spec §4.9 "Auth shim").
fn extract_token(headers: &HeaderMap, allow_bearer_shim: bool) -> Option<String> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key.to_string());
    }
    if allow_bearer_shim {
        return extract_bearer(headers);
    }
    None
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Checks `token` against every configured tenant key without early-returning on the first
/// match, so the time taken does not reveal which key (if any) matched.
fn is_valid_tenant_key(token: &str, keys: &std::collections::HashSet<String>) -> bool {
    let mut matched = false;
    for key in keys {
        // `|=` on bool never short-circuits, unlike `||`.
        matched |= constant_time_eq(token, key);
    }
    matched
}

async fn authenticate(
    state: &AppState,
    mut request: Request,
    next: Next,
    allow_bearer_shim: bool,
) -> Result<Response, gateway_core::GatewayError> {
    let token = extract_token(request.headers(), allow_bearer_shim)
        .ok_or_else(|| authentication("missing X-API-Key or Authorization header"))?;
    if !is_valid_tenant_key(&token, &state.config.api_keys) {
        return Err(authentication("invalid API key"));
    }
    request.extensions_mut().insert(Owner(token));
    Ok(next.run(request).await)
}

pub async fn native_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, NativeError> {
    authenticate(&state, request, next, false).await.map_err(NativeError)
}

pub async fn compat_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, CompatError> {
    authenticate(&state, request, next, true).await.map_err(CompatError)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                v.parse().unwrap(),
            );
        }
        h
    }

    #[test]
    fn x_api_key_is_preferred_over_bearer() {
        let h = headers(&[("x-api-key", "direct"), ("authorization", "Bearer shimmed")]);
        assert_eq!(extract_token(&h, true), Some("direct".to_string()));
    }

    #[test]
    fn bearer_shim_only_applies_when_allowed() {
        let h = headers(&[("authorization", "Bearer t1")]);
        assert_eq!(extract_token(&h, false), None);
        assert_eq!(extract_token(&h, true), Some("t1".to_string()));
    }

    #[test]
    fn bearer_scheme_match_is_case_insensitive() {
        let h = headers(&[("authorization", "bearer t2")]);
        assert_eq!(extract_token(&h, true), Some("t2".to_string()));
    }

    #[test]
    fn missing_headers_resolve_to_none() {
        let h = HeaderMap::new();
        assert_eq!(extract_token(&h, true), None);
    }

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "wrong"));
    }

    #[test]
    fn distinct_tenants_each_validate_their_own_key() {
        let keys: std::collections::HashSet<String> =
            ["tenant-a".to_string(), "tenant-b".to_string()].into_iter().collect();
        assert!(is_valid_tenant_key("tenant-a", &keys));
        assert!(is_valid_tenant_key("tenant-b", &keys));
        assert!(!is_valid_tenant_key("tenant-c", &keys));
    }
}
