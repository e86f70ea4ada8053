//! Gateway-wide error taxonomy (spec §4.11): one kind-tagged hierarchy every component maps
//! its own errors into. The wire-format mapping (native vs OpenAI-compatible) lives in
//! `gateway-server`, which only needs `kind`/`code`/`message`/`details` from here.

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    InvalidState,
    RateLimited,
    Timeout,
    ToolUnavailable,
    Upstream,
    Internal,
}

impl ErrorKind {
    /// HTTP status this kind maps to on the native route namespace.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::Authorization => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::InvalidState => 409,
            ErrorKind::RateLimited => 429,
            ErrorKind::Timeout => 408,
            ErrorKind::ToolUnavailable => 503,
            ErrorKind::Upstream => 502,
            ErrorKind::Internal => 500,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> u16 {
        self.kind.http_status()
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, "not_found", message)
    }

    pub fn model_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, "model_not_found", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, "validation", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, "timeout", message)
    }

    pub fn tool_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolUnavailable, "tool_unavailable", message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, "upstream", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "internal", message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, "invalid_state", message)
    }
}

impl From<gateway_store::StoreError> for GatewayError {
    fn from(err: gateway_store::StoreError) -> Self {
        match err {
            gateway_store::StoreError::NotFound => GatewayError::not_found("resource not found"),
            gateway_store::StoreError::AlreadyExists => {
                GatewayError::new(ErrorKind::Conflict, "conflict", "resource already exists")
            }
            gateway_store::StoreError::LockConflict => GatewayError::new(
                ErrorKind::Conflict,
                "conflict",
                "could not acquire session lock",
            ),
            gateway_store::StoreError::Storage(msg) => GatewayError::internal(msg),
        }
    }
}
