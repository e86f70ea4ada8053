//! Wire-format error mapping (spec §4.11, §4.9 "Error translation"): the same `GatewayError`
//! renders differently depending on which route namespace is answering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gateway_core::{ErrorKind, GatewayError};
use serde::Serialize;
use serde_json::Value;

/// Renders on the native `/api/v1/*` namespace: `{code, message, details?}`.
pub struct NativeError(pub GatewayError);

#[derive(Serialize)]
struct NativeErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

impl IntoResponse for NativeError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = NativeErrorBody {
            code: &self.0.code,
            message: &self.0.message,
            details: self.0.details.as_ref(),
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Renders on the compatibility `/v1/*` namespace: `{error: {type, message, code?, param?}}`
/// (spec §4.9 "Error translation").
pub struct CompatError(pub GatewayError);

#[derive(Serialize)]
pub struct CompatErrorEnvelope<'a> {
    error: CompatErrorBody<'a>,
}

#[derive(Serialize)]
pub struct CompatErrorBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    param: Option<&'a str>,
}

/// Status-code → OpenAI error type (spec §4.9).
pub fn openai_error_type(status: u16) -> &'static str {
    match status {
        400 => "invalid_request_error",
        401 => "authentication_error",
        403 => "permission_error",
        404 => "not_found_error",
        408 => "timeout_error",
        429 => "rate_limit_error",
        503 => "service_unavailable",
        _ => "server_error",
    }
}

impl IntoResponse for CompatError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(compat_error_envelope(&self.0))).into_response()
    }
}

/// Builds the `{error: {...}}` envelope body (spec §4.9 "Error translation"), shared between
/// the ordinary JSON error response and the mid-stream error frame an SSE completion emits.
pub fn compat_error_envelope(err: &GatewayError) -> CompatErrorEnvelope<'_> {
    CompatErrorEnvelope {
        error: CompatErrorBody {
            kind: openai_error_type(err.status()),
            message: &err.message,
            code: Some(&err.code),
            param: None,
        },
    }
}

pub fn validation(message: impl Into<String>) -> GatewayError {
    GatewayError::new(ErrorKind::Validation, "validation", message)
}

pub fn authentication(message: impl Into<String>) -> GatewayError {
    GatewayError::new(ErrorKind::Authentication, "authentication", message)
}

pub fn rate_limited(message: impl Into<String>) -> GatewayError {
    GatewayError::new(ErrorKind::RateLimited, "rate_limited", message)
}
